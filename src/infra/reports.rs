// ============================================================
// Layer 6 — Report Artifacts
// ============================================================
// Two kinds of report leave a training run:
//
//   laundering-model-report    — the AUC table (see ml::evaluator)
//   laundering-quality-report  — data drift between the train and
//                                test partitions, target drift,
//                                and the model's scores
//
// ReportPublisher writes each one as `<reports_dir>/<key>.md`
// and remembers what it wrote, so the orchestrator can attach
// every report to the tracking run afterwards.
//
// Drift measures:
//   numeric columns     — population stability index over 10
//                         bins cut at the train deciles
//                         PSI = Σ (a - e) · ln(a / e)
//   categorical columns — total variation distance between the
//                         category frequencies
//                         TVD = ½ Σ |p_train - p_test|
//
// Reference: Yurdakul (2018) Statistical Properties of the
//            Population Stability Index

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::domain::record::Dataset;
use crate::ml::features::{to_numeric, FeatureSpec};

pub const QUALITY_REPORT_KEY: &str = "laundering-quality-report";

/// PSI above this is treated as a shifted distribution.
pub const PSI_DRIFT_THRESHOLD: f64 = 0.2;
/// TVD above this is treated as a shifted distribution.
pub const TVD_DRIFT_THRESHOLD: f64 = 0.1;

const PSI_BINS: usize = 10;
const PSI_FLOOR: f64 = 1e-4;

// ─── Publisher ────────────────────────────────────────────────────────────────

/// Writes named markdown/JSON artifacts into a directory.
pub struct ReportPublisher {
    dir:       PathBuf,
    published: Mutex<Vec<PathBuf>>,
}

impl ReportPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create reports directory '{}'", dir.display()))?;
        Ok(Self { dir, published: Mutex::new(Vec::new()) })
    }

    /// Write `<key>.md` and return its path.
    pub fn publish_markdown(&self, key: &str, markdown: &str) -> Result<PathBuf> {
        self.write(&format!("{key}.md"), markdown.as_bytes())
    }

    /// Write `<key>.json` and return its path.
    pub fn publish_json<T: Serialize>(&self, key: &str, value: &T) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write(&format!("{key}.json"), &json)
    }

    /// Write an arbitrary file name.
    pub fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        fs::write(&path, bytes)
            .with_context(|| format!("Cannot write report '{}'", path.display()))?;
        tracing::info!("Published report artifact '{}'", path.display());
        self.published.lock().push(path.clone());
        Ok(path)
    }

    /// Every artifact written so far, in order.
    pub fn published(&self) -> Vec<PathBuf> {
        self.published.lock().clone()
    }
}

// ─── Quality Report ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct NumericDrift {
    pub column:     String,
    pub train_mean: f64,
    pub test_mean:  f64,
    pub train_std:  f64,
    pub test_std:   f64,
    pub psi:        f64,
    pub drifted:    bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoricalDrift {
    pub column:   String,
    pub tvd:      f64,
    /// Categories seen in test but never in train
    pub unseen:   Vec<String>,
    pub drifted:  bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub run_id:              String,
    pub model_version:       u64,
    pub train_rows:          usize,
    pub test_rows:           usize,
    pub train_positive_rate: f64,
    pub test_positive_rate:  f64,
    pub train_auc:           f64,
    pub test_auc:            f64,
    pub numeric:             Vec<NumericDrift>,
    pub categorical:         Vec<CategoricalDrift>,
}

impl QualityReport {
    pub fn drifted_columns(&self) -> Vec<&str> {
        self.numeric
            .iter()
            .filter(|d| d.drifted)
            .map(|d| d.column.as_str())
            .chain(self.categorical.iter().filter(|d| d.drifted).map(|d| d.column.as_str()))
            .collect()
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Data and Model Quality Report\n");
        let _ = writeln!(md, "Run `{}`, model version {}\n", self.run_id, self.model_version);

        let _ = writeln!(md, "## Model Quality\n");
        let _ = writeln!(md, "| Dataset | Rows | Positive rate | AUC ROC |");
        let _ = writeln!(md, "|:--------|-----:|--------------:|--------:|");
        let _ = writeln!(
            md,
            "| train | {} | {:.4} | {:.2} |",
            self.train_rows, self.train_positive_rate, self.train_auc
        );
        let _ = writeln!(
            md,
            "| test | {} | {:.4} | {:.2} |\n",
            self.test_rows, self.test_positive_rate, self.test_auc
        );

        if !self.numeric.is_empty() {
            let _ = writeln!(md, "## Numeric Drift\n");
            let _ = writeln!(md, "| Column | Train mean | Test mean | Train std | Test std | PSI | Drift |");
            let _ = writeln!(md, "|:-------|-----------:|----------:|----------:|---------:|----:|:-----:|");
            for d in &self.numeric {
                let _ = writeln!(
                    md,
                    "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} | {} |",
                    d.column, d.train_mean, d.test_mean, d.train_std, d.test_std, d.psi,
                    if d.drifted { "yes" } else { "no" }
                );
            }
            md.push('\n');
        }

        if !self.categorical.is_empty() {
            let _ = writeln!(md, "## Categorical Drift\n");
            let _ = writeln!(md, "| Column | TVD | Unseen in train | Drift |");
            let _ = writeln!(md, "|:-------|----:|:----------------|:-----:|");
            for d in &self.categorical {
                let _ = writeln!(
                    md,
                    "| {} | {:.4} | {} | {} |",
                    d.column,
                    d.tvd,
                    d.unseen.join(", "),
                    if d.drifted { "yes" } else { "no" }
                );
            }
        }
        md
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n    = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var  = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Present, finite values of a numeric column.
fn numeric_values(data: &Dataset, column: &str) -> Vec<f64> {
    data.column(column)
        .map(to_numeric)
        .filter(|x| !x.is_nan())
        .collect()
}

/// PSI of `actual` against bins cut at the deciles of `expected`.
pub fn population_stability_index(expected: &[f64], actual: &[f64]) -> f64 {
    if expected.is_empty() || actual.is_empty() {
        return 0.0;
    }
    let mut sorted = expected.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut edges: Vec<f64> = (1..PSI_BINS)
        .map(|i| sorted[(i * sorted.len() / PSI_BINS).min(sorted.len() - 1)])
        .collect();
    edges.dedup();

    let shares = |values: &[f64]| -> Vec<f64> {
        let mut counts = vec![0usize; edges.len() + 1];
        for &v in values {
            counts[edges.partition_point(|&e| e <= v)] += 1;
        }
        counts
            .into_iter()
            .map(|c| (c as f64 / values.len() as f64).max(PSI_FLOOR))
            .collect()
    };

    shares(expected)
        .into_iter()
        .zip(shares(actual))
        .map(|(e, a)| (a - e) * (a / e).ln())
        .sum()
}

fn category_key(value: &Value) -> Option<String> {
    match value {
        Value::Null      => None,
        Value::String(s) => Some(s.clone()),
        other            => Some(other.to_string()),
    }
}

fn frequencies(data: &Dataset, column: &str) -> BTreeMap<String, f64> {
    let keys: Vec<String> = data.column(column).flatten().filter_map(category_key).collect();
    let mut freq = BTreeMap::new();
    for key in &keys {
        *freq.entry(key.clone()).or_insert(0.0) += 1.0;
    }
    let total = keys.len().max(1) as f64;
    freq.values_mut().for_each(|v| *v /= total);
    freq
}

/// Total variation distance between two frequency tables.
pub fn total_variation_distance(p: &BTreeMap<String, f64>, q: &BTreeMap<String, f64>) -> f64 {
    let keys: std::collections::BTreeSet<&String> = p.keys().chain(q.keys()).collect();
    0.5 * keys
        .into_iter()
        .map(|k| (p.get(k).unwrap_or(&0.0) - q.get(k).unwrap_or(&0.0)).abs())
        .sum::<f64>()
}

/// Inputs of [`generate_quality_reports`] besides the data itself.
pub struct QualityContext<'a> {
    pub features:      &'a FeatureSpec,
    pub output_column: &'a str,
    pub train_auc:     f64,
    pub test_auc:      f64,
    pub run_id:        &'a str,
    pub model_version: u64,
}

fn positive_rate(data: &Dataset, output_column: &str) -> f64 {
    match data.labels(output_column) {
        Ok(labels) if !labels.is_empty() => {
            labels.iter().filter(|&&y| y == 1).count() as f64 / labels.len() as f64
        }
        _ => 0.0,
    }
}

/// Compare the train and test partitions and publish the result
/// as markdown and JSON.
pub fn generate_quality_reports(
    train:     &Dataset,
    test:      &Dataset,
    ctx:       &QualityContext<'_>,
    publisher: &ReportPublisher,
) -> Result<QualityReport> {
    let numeric = ctx
        .features
        .numeric_columns
        .iter()
        .map(|column| {
            let (a, b) = (numeric_values(train, column), numeric_values(test, column));
            let (train_mean, train_std) = mean_std(&a);
            let (test_mean, test_std)   = mean_std(&b);
            let psi = population_stability_index(&a, &b);
            NumericDrift {
                column: column.clone(),
                train_mean,
                test_mean,
                train_std,
                test_std,
                psi,
                drifted: psi > PSI_DRIFT_THRESHOLD,
            }
        })
        .collect();

    let categorical = ctx
        .features
        .categorical_columns
        .iter()
        .map(|column| {
            let (p, q) = (frequencies(train, column), frequencies(test, column));
            let tvd    = total_variation_distance(&p, &q);
            let unseen = q.keys().filter(|k| !p.contains_key(*k)).cloned().collect();
            CategoricalDrift {
                column: column.clone(),
                tvd,
                unseen,
                drifted: tvd > TVD_DRIFT_THRESHOLD,
            }
        })
        .collect();

    let report = QualityReport {
        run_id:              ctx.run_id.to_string(),
        model_version:       ctx.model_version,
        train_rows:          train.len(),
        test_rows:           test.len(),
        train_positive_rate: positive_rate(train, ctx.output_column),
        test_positive_rate:  positive_rate(test, ctx.output_column),
        train_auc:           ctx.train_auc,
        test_auc:            ctx.test_auc,
        numeric,
        categorical,
    };

    let drifted = report.drifted_columns();
    if drifted.is_empty() {
        tracing::info!("No feature drift detected between train and test");
    } else {
        tracing::warn!("Feature drift detected in: {}", drifted.join(", "));
    }

    publisher.publish_markdown(QUALITY_REPORT_KEY, &report.to_markdown())?;
    publisher.publish_json(QUALITY_REPORT_KEY, &report)?;
    Ok(report)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::Record;
    use serde_json::json;

    fn dataset(amounts: &[f64], formats: &[&str]) -> Dataset {
        Dataset::new(
            amounts
                .iter()
                .zip(formats)
                .enumerate()
                .map(|(i, (a, f))| {
                    Record::from([
                        ("amount".to_string(), json!(a)),
                        ("format".to_string(), json!(f)),
                        ("y".to_string(), json!(i % 2)),
                    ])
                })
                .collect(),
        )
    }

    #[test]
    fn test_psi_is_zero_for_identical_samples() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        assert!(population_stability_index(&values, &values).abs() < 1e-12);
    }

    #[test]
    fn test_psi_flags_shifted_samples() {
        let expected: Vec<f64> = (0..100).map(f64::from).collect();
        let actual:   Vec<f64> = (0..100).map(|i| f64::from(i) + 80.0).collect();
        assert!(population_stability_index(&expected, &actual) > PSI_DRIFT_THRESHOLD);
    }

    #[test]
    fn test_tvd_bounds() {
        let p = BTreeMap::from([("a".to_string(), 1.0)]);
        let q = BTreeMap::from([("b".to_string(), 1.0)]);
        assert_eq!(total_variation_distance(&p, &p), 0.0);
        assert_eq!(total_variation_distance(&p, &q), 1.0);
    }

    #[test]
    fn test_quality_report_is_published() {
        let dir       = tempfile::tempdir().unwrap();
        let publisher = ReportPublisher::new(dir.path()).unwrap();
        let train     = dataset(&[1.0, 2.0, 3.0, 4.0], &["wire", "wire", "cash", "cash"]);
        let test      = dataset(&[1.0, 2.0], &["wire", "crypto"]);
        let features  = FeatureSpec {
            numeric_columns:     vec!["amount".to_string()],
            categorical_columns: vec!["format".to_string()],
        };
        let ctx = QualityContext {
            features:      &features,
            output_column: "y",
            train_auc:     0.9,
            test_auc:      0.8,
            run_id:        "run-1",
            model_version: 3,
        };

        let report = generate_quality_reports(&train, &test, &ctx, &publisher).unwrap();
        assert_eq!(report.categorical[0].unseen, vec!["crypto".to_string()]);
        assert!(report.categorical[0].drifted);
        assert_eq!(report.train_positive_rate, 0.5);

        let md = fs::read_to_string(dir.path().join("laundering-quality-report.md")).unwrap();
        assert!(md.contains("model version 3"));
        assert_eq!(publisher.published().len(), 2);
    }
}
