// ============================================================
// Layer 3 — Record / Dataset Domain Types
// ============================================================
// A transaction is a schema-free map of column name → JSON
// value. The set of columns varies by source, so nothing here
// assumes a fixed schema: the feature pipeline picks the
// columns it was configured with and ignores the rest.
//
// Dataset is row-oriented. That keeps shuffling and splitting
// trivial (they just move rows around) and lets the splitter
// stay generic over Vec<T>.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::DataError;

/// One transaction: column name → raw value.
pub type Record = BTreeMap<String, Value>;

/// An ordered collection of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<Record>,
}

impl Dataset {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    /// Build a dataset from a mapping of column → values.
    /// Every column must have the same number of values.
    pub fn from_columns(columns: BTreeMap<String, Vec<Value>>) -> Result<Self, DataError> {
        let expected = columns.values().next().map(Vec::len).unwrap_or(0);

        for (name, values) in &columns {
            if values.len() != expected {
                return Err(DataError::ColumnLengthMismatch {
                    column: name.clone(),
                    expected,
                    found: values.len(),
                });
            }
        }

        let mut rows: Vec<Record> = (0..expected).map(|_| Record::new()).collect();
        for (name, values) in columns {
            for (row, value) in rows.iter_mut().zip(values) {
                row.insert(name.clone(), value);
            }
        }

        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    /// Union of the column names seen in any row.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|r| r.keys().map(String::as_str))
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.rows.iter().any(|r| r.contains_key(name))
    }

    /// Fail with MissingColumn for the first column no row carries.
    pub fn require_columns(&self, names: &[String]) -> Result<(), DataError> {
        match names.iter().find(|n| !self.has_column(n)) {
            Some(missing) => Err(DataError::MissingColumn(missing.clone())),
            None => Ok(()),
        }
    }

    /// Values of one column, `None` where a row lacks it.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = Option<&'a Value>> + 'a {
        self.rows.iter().map(move |r| r.get(name))
    }

    /// Keep only the given columns in every row.
    pub fn select(&self, columns: &[String]) -> Dataset {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .filter_map(|c| r.get(c).map(|v| (c.clone(), v.clone())))
                    .collect()
            })
            .collect();
        Dataset { rows }
    }

    /// Rows at the given indices, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Write `column` on every row from a function of the row.
    pub fn set_column<F>(&mut self, column: &str, mut f: F)
    where
        F: FnMut(&Record) -> Value,
    {
        for row in &mut self.rows {
            let value = f(row);
            row.insert(column.to_string(), value);
        }
    }

    /// Read a 0/1 label column.
    /// Accepts integers, floats equal to 0 or 1, and booleans.
    pub fn labels(&self, column: &str) -> Result<Vec<u8>, DataError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                let label = match r.get(column) {
                    Some(Value::Bool(b)) => Some(u8::from(*b)),
                    Some(Value::Number(n)) => match n.as_f64() {
                        Some(x) if x == 0.0 => Some(0),
                        Some(x) if x == 1.0 => Some(1),
                        _ => None,
                    },
                    _ => None,
                };
                label.ok_or_else(|| DataError::InvalidLabel {
                    column: column.to_string(),
                    row,
                })
            })
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> BTreeMap<String, Vec<Value>> {
        let mut cols = BTreeMap::new();
        cols.insert("amount".to_string(), vec![json!(10.5), json!(3)]);
        cols.insert("currency".to_string(), vec![json!("USD"), json!("EUR")]);
        cols
    }

    #[test]
    fn test_from_columns_builds_rows() {
        let ds = Dataset::from_columns(columns()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows()[1]["currency"], json!("EUR"));
        assert_eq!(ds.columns().len(), 2);
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let mut cols = columns();
        cols.insert("extra".to_string(), vec![json!(1)]);
        let err = Dataset::from_columns(cols).unwrap_err();
        assert!(matches!(err, DataError::ColumnLengthMismatch { found: 1, .. }));
    }

    #[test]
    fn test_select_drops_other_columns() {
        let ds  = Dataset::from_columns(columns()).unwrap();
        let sel = ds.select(&["amount".to_string()]);
        assert!(sel.has_column("amount"));
        assert!(!sel.has_column("currency"));
    }

    #[test]
    fn test_labels_accept_ints_floats_and_bools() {
        let ds = Dataset::new(vec![
            Record::from([("y".to_string(), json!(1))]),
            Record::from([("y".to_string(), json!(0.0))]),
            Record::from([("y".to_string(), json!(true))]),
        ]);
        assert_eq!(ds.labels("y").unwrap(), vec![1, 0, 1]);
    }

    #[test]
    fn test_labels_reject_other_values() {
        let ds = Dataset::new(vec![Record::from([("y".to_string(), json!(2))])]);
        assert_eq!(
            ds.labels("y").unwrap_err(),
            DataError::InvalidLabel { column: "y".to_string(), row: 0 }
        );
    }

    #[test]
    fn test_require_columns_names_the_missing_one() {
        let ds  = Dataset::from_columns(columns()).unwrap();
        let err = ds
            .require_columns(&["amount".to_string(), "country".to_string()])
            .unwrap_err();
        assert_eq!(err, DataError::MissingColumn("country".to_string()));
    }
}
