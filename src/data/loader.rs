// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Deserializes the downloaded transaction dump into a Dataset.
//
// Two JSON layouts are accepted, matching the two shapes a
// tabular export usually takes:
//
//   column-oriented:  {"amount": [10.0, 3.5], "currency": ["USD", "EUR"]}
//   record-oriented:  [{"amount": 10.0, "currency": "USD"}, ...]
//
// serde's untagged enum tries each layout in turn, so callers
// never have to say which one they have.
//
// Reference: serde docs (Enum representations: untagged)

use std::collections::BTreeMap;
use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::record::{Dataset, Record};

/// The on-disk layouts of a dataset dump.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    Columns(BTreeMap<String, Vec<Value>>),
    Records(Vec<Record>),
}

impl RawPayload {
    pub fn into_dataset(self) -> Result<Dataset> {
        match self {
            RawPayload::Columns(columns) => Ok(Dataset::from_columns(columns)?),
            RawPayload::Records(rows)    => Ok(Dataset::new(rows)),
        }
    }
}

/// Parse a dataset from raw bytes.
pub fn parse_dataset(bytes: &[u8]) -> Result<Dataset> {
    let payload: RawPayload = serde_json::from_slice(bytes)
        .context("Dataset is neither a column map nor a list of records")?;
    payload.into_dataset()
}

/// Read and parse a dataset file.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read dataset '{}'", path.display()))?;

    let dataset = parse_dataset(&bytes)
        .with_context(|| format!("Cannot parse dataset '{}'", path.display()))?;

    tracing::info!(
        "Loaded {} rows with {} columns from '{}'",
        dataset.len(),
        dataset.columns().len(),
        path.display()
    );
    Ok(dataset)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_column_layout() {
        let bytes = br#"{"amount": [1.5, 2.0, 3.0], "currency": ["USD", "EUR", null]}"#;
        let ds    = parse_dataset(bytes).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.rows()[2]["currency"], Value::Null);
    }

    #[test]
    fn test_parses_record_layout() {
        let bytes = br#"[{"amount": 1.5}, {"amount": 2.0, "currency": "EUR"}]"#;
        let ds    = parse_dataset(bytes).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows()[1]["currency"], json!("EUR"));
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let bytes = br#"{"amount": [1.5, 2.0], "currency": ["USD"]}"#;
        assert!(parse_dataset(bytes).is_err());
    }

    #[test]
    fn test_rejects_scalars() {
        assert!(parse_dataset(b"42").is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"a": [1, 2]}"#).unwrap();
        assert_eq!(load_dataset(&path).unwrap().len(), 2);
    }
}
