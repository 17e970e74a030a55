// ============================================================
// Layer 5 — Feature Pipeline
// ============================================================
// Turns schema-free records into a dense feature matrix.
// Two independent branches, then a column-wise union:
//
//   numeric columns                 categorical columns
//       │                               │
//   extract                         extract
//       │                               │
//   coerce to f64                   impute most frequent
//   (non-numeric → NaN)                 │
//       │                           row → {column: value}
//   fill NaN with 0.0                   │
//       │                           dict vectorize
//   standardize                     (strings one-hot as "col=value",
//   (zero mean, unit variance)       numbers kept as "col")
//       │                               │
//       └──────────── union ────────────┘
//                       │
//                 [n_rows, n_numeric + n_vocab]
//
// Every branch is fitted on the training rows only and then
// reused unchanged at prediction time.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::record::{Dataset, Record};

/// Which columns feed which branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub numeric_columns:     Vec<String>,
    pub categorical_columns: Vec<String>,
}

impl FeatureSpec {
    /// Numeric columns followed by categorical columns.
    pub fn all_columns(&self) -> Vec<String> {
        self.numeric_columns
            .iter()
            .chain(&self.categorical_columns)
            .cloned()
            .collect()
    }
}

// ─── Numeric Branch ───────────────────────────────────────────────────────────

/// Coerce a raw cell to a number. Anything unparsable is NaN.
pub fn to_numeric(value: Option<&Value>) -> f64 {
    let x = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Some(Value::Bool(b))   => f64::from(u8::from(*b)),
        _ => f64::NAN,
    };
    if x.is_finite() { x } else { f64::NAN }
}

/// Fitted numeric branch: coerce → fill → standardize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericBranch {
    columns:    Vec<String>,
    fill_value: f64,
    means:      Vec<f64>,
    scales:     Vec<f64>,
}

impl NumericBranch {
    pub const FILL_VALUE: f64 = 0.0;

    pub fn fit(columns: &[String], data: &Dataset) -> Self {
        let raw = Self::extract(columns, data, Self::FILL_VALUE);
        let n   = raw.nrows().max(1) as f64;

        let mut means  = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());
        for col in raw.columns() {
            let mean = col.sum() / n;
            let var  = col.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std  = var.sqrt();
            means.push(mean);
            // A constant column would divide by zero; leave it unscaled
            scales.push(if std > 0.0 { std } else { 1.0 });
        }

        Self {
            columns: columns.to_vec(),
            fill_value: Self::FILL_VALUE,
            means,
            scales,
        }
    }

    pub fn transform(&self, data: &Dataset) -> Array2<f64> {
        let mut out = Self::extract(&self.columns, data, self.fill_value);
        for (j, mut col) in out.columns_mut().into_iter().enumerate() {
            col.mapv_inplace(|x| (x - self.means[j]) / self.scales[j]);
        }
        out
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn extract(columns: &[String], data: &Dataset, fill_value: f64) -> Array2<f64> {
        Array2::from_shape_fn((data.len(), columns.len()), |(i, j)| {
            let x = to_numeric(data.rows()[i].get(&columns[j]));
            if x.is_nan() { fill_value } else { x }
        })
    }
}

// ─── Categorical Branch ───────────────────────────────────────────────────────

/// A non-missing categorical cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category {
    Number(f64),
    Text(String),
}

impl Category {
    /// `None` for null, which counts as missing.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null      => None,
            Value::Bool(b)   => Some(Category::Number(f64::from(u8::from(*b)))),
            Value::Number(n) => n.as_f64().map(Category::Number),
            Value::String(s) => Some(Category::Text(s.clone())),
            other            => Some(Category::Text(other.to_string())),
        }
    }

    /// Numbers sort before text; used to break frequency ties.
    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Category::Number(a), Category::Number(b)) => a.total_cmp(b),
            (Category::Number(_), Category::Text(_))   => Ordering::Less,
            (Category::Text(_), Category::Number(_))   => Ordering::Greater,
            (Category::Text(a), Category::Text(b))     => a.cmp(b),
        }
    }

    /// Dict-vectorizer feature name and value for this cell.
    fn feature(&self, column: &str) -> (String, f64) {
        match self {
            Category::Text(s)   => (format!("{column}={s}"), 1.0),
            Category::Number(x) => (column.to_string(), *x),
        }
    }
}

/// Map key ordering categories by `Category::total_cmp`.
struct Ordered(Category);

impl PartialEq for Ordered {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ordered {}

impl PartialOrd for Ordered {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ordered {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Most frequent category; ties go to the smallest value.
fn most_frequent(values: impl Iterator<Item = Category>) -> Option<Category> {
    let mut counts: BTreeMap<Ordered, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(Ordered(value)).or_default() += 1;
    }
    // Ascending key order, so only a strictly higher count replaces
    let mut best: Option<(Ordered, usize)> = None;
    for (key, n) in counts {
        if best.as_ref().map_or(true, |(_, top)| n > *top) {
            best = Some((key, n));
        }
    }
    best.map(|(Ordered(c), _)| c)
}

/// Fitted categorical branch: impute → to dict → vectorize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalBranch {
    columns:     Vec<String>,
    /// Per-column imputation value; `None` when a column was
    /// entirely missing during fit.
    fill_values: Vec<Option<Category>>,
    /// Feature name → output column index, names sorted.
    vocabulary:  BTreeMap<String, usize>,
}

impl CategoricalBranch {
    pub fn fit(columns: &[String], data: &Dataset) -> Self {
        let fill_values: Vec<Option<Category>> = columns
            .iter()
            .map(|c| most_frequent(data.column(c).flatten().filter_map(Category::from_value)))
            .collect();

        let mut branch = Self {
            columns: columns.to_vec(),
            fill_values,
            vocabulary: BTreeMap::new(),
        };

        let names: BTreeSet<String> = data
            .rows()
            .iter()
            .flat_map(|row| branch.row_features(row))
            .map(|(name, _)| name)
            .collect();
        branch.vocabulary = names.into_iter().enumerate().map(|(i, n)| (n, i)).collect();
        branch
    }

    /// Unseen feature names are dropped, like a fitted DictVectorizer.
    pub fn transform(&self, data: &Dataset) -> Array2<f64> {
        let mut out = Array2::zeros((data.len(), self.vocabulary.len()));
        for (i, row) in data.rows().iter().enumerate() {
            for (name, value) in self.row_features(row) {
                if let Some(&j) = self.vocabulary.get(&name) {
                    out[[i, j]] = value;
                }
            }
        }
        out
    }

    pub fn width(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        // BTreeMap iterates in name order, which is also index order
        self.vocabulary.keys().cloned().collect()
    }

    /// Imputed {column: value} view of one row, as dict features.
    fn row_features(&self, row: &Record) -> Vec<(String, f64)> {
        self.columns
            .iter()
            .zip(&self.fill_values)
            .filter_map(|(column, fill)| {
                let cell = row.get(column).and_then(Category::from_value);
                cell.or_else(|| fill.clone()).map(|c| c.feature(column))
            })
            .collect()
    }
}

// ─── Feature Union ────────────────────────────────────────────────────────────

/// Both fitted branches; output is numeric columns then categorical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureUnion {
    numeric:     NumericBranch,
    categorical: CategoricalBranch,
}

impl FeatureUnion {
    /// Fit both branches on `data`.
    /// Every configured column must appear in at least one row.
    pub fn fit(spec: &FeatureSpec, data: &Dataset) -> Result<Self> {
        data.require_columns(&spec.all_columns())?;

        let union = Self {
            numeric:     NumericBranch::fit(&spec.numeric_columns, data),
            categorical: CategoricalBranch::fit(&spec.categorical_columns, data),
        };
        tracing::debug!(
            "Feature union fitted: {} numeric + {} categorical features",
            union.numeric.width(),
            union.categorical.width()
        );
        Ok(union)
    }

    pub fn transform(&self, data: &Dataset) -> Array2<f64> {
        let numeric     = self.numeric.transform(data);
        let categorical = self.categorical.transform(data);
        let split       = numeric.ncols();

        let mut out = Array2::zeros((data.len(), self.width()));
        out.slice_mut(s![.., ..split]).assign(&numeric);
        out.slice_mut(s![.., split..]).assign(&categorical);
        out
    }

    pub fn width(&self) -> usize {
        self.numeric.width() + self.categorical.width()
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.numeric.feature_names();
        names.extend(self.categorical.feature_names());
        names
    }
}
