// ============================================================
// Layer 6 — Model Checkpoints
// ============================================================
// Saves and restores a FittedModel as a JSON file.
//
// What gets saved:
//   model.json — feature union state, every boosted tree,
//                the winning hyperparameters and CV results
//
// Why JSON and not a binary format?
//   The same bytes are logged to the tracking run under
//   `models/model.json`, where a human may want to open them.
//   Loading fails loudly if the file does not match the
//   FittedModel layout.
//
// File naming convention:
//   <dir>/
//     model.json   ← the latest model saved to this directory
//
// Reference: Rust Book §9 (Error Handling)
//            serde_json documentation

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::ml::model::FittedModel;

/// File name of a saved model, locally and as a run artifact.
pub const MODEL_FILE: &str = "model.json";

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    /// Directory where the model file is stored
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager.
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Path of the model file inside this directory.
    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    /// Serialise the model to `{dir}/model.json`.
    /// Returns the bytes written so callers can log the same
    /// payload as a run artifact.
    pub fn save_model(&self, model: &FittedModel) -> Result<Vec<u8>> {
        let path  = self.model_path();
        let bytes = model.to_json_bytes()?;
        fs::write(&path, &bytes)
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;
        tracing::debug!("Saved model checkpoint to '{}'", path.display());
        Ok(bytes)
    }

    /// Load the model saved in this directory.
    #[cfg(test)]
    pub fn load_model(&self) -> Result<FittedModel> {
        load_model_file(&self.model_path())
    }
}

/// Load a model from any JSON file written by `save_model`.
pub fn load_model_file(path: &Path) -> Result<FittedModel> {
    let bytes = fs::read(path).with_context(|| {
        format!(
            "Cannot read model '{}'. Have you run 'train' first?",
            path.display()
        )
    })?;
    FittedModel::from_json_bytes(&bytes)
        .with_context(|| format!("'{}' is not a saved model", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{Dataset, Record};
    use crate::ml::booster::BoosterParams;
    use crate::ml::features::FeatureSpec;
    use crate::ml::model::FittedPipeline;
    use serde_json::json;

    fn model() -> FittedModel {
        let spec = FeatureSpec { numeric_columns: vec!["x".to_string()], categorical_columns: Vec::new() };
        let data = Dataset::new(
            (0..10).map(|i| Record::from([("x".to_string(), json!(i))])).collect(),
        );
        let labels: Vec<u8> = (0..10).map(|i| u8::from(i >= 5)).collect();
        let params   = BoosterParams { n_estimators: 3, ..Default::default() };
        let pipeline = FittedPipeline::fit(&spec, &data, &labels, params).unwrap();
        FittedModel::new(spec, params, 1.0, Vec::new(), pipeline)
    }

    #[test]
    fn test_save_then_load() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("models")).unwrap();
        let model   = model();

        let bytes = manager.save_model(&model).unwrap();
        assert_eq!(bytes, fs::read(manager.model_path()).unwrap());

        let loaded = manager.load_model().unwrap();
        assert_eq!(loaded.best_params, model.best_params);
        assert_eq!(loaded.feature_names(), model.feature_names());
    }

    #[test]
    fn test_missing_model_mentions_train() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model_file(&dir.path().join("model.json")).unwrap_err();
        assert!(err.to_string().contains("train"));
    }
}
