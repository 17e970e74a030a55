// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Scores a dataset file with either:
//
//   • a model file on disk (`--model PATH`), or
//   • the serving model from the registry: the Production
//     version (else the highest version), whose `models/model.json`
//     artifact is fetched from the run that produced it.
//
// Reference: Rust Book §9 (Error Handling)

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::registrar::{ModelRegistrar, MODEL_ARTIFACT_DIR};
use crate::application::services::Services;
use crate::data::loader::load_dataset;
use crate::domain::model_version::ModelVersion;
use crate::infra::checkpoint::{load_model_file, MODEL_FILE};
use crate::infra::config::TrackingConfig;
use crate::ml::model::{predict, FittedModel};

/// Run id of a `runs:/<run_id>/...` source URI.
fn run_id_from_source(source: &str) -> Option<&str> {
    source
        .strip_prefix("runs:/")
        .and_then(|rest| rest.split('/').next())
        .filter(|id| !id.is_empty())
}

pub struct PredictUseCase {
    tracking: TrackingConfig,
    services: Services,
}

impl PredictUseCase {
    pub fn new(tracking: TrackingConfig, services: Services) -> Self {
        Self { tracking, services }
    }

    fn registrar(&self) -> ModelRegistrar<'_> {
        ModelRegistrar::new(
            self.services.tracker.as_ref(),
            self.services.registry.as_ref(),
            &self.tracking,
        )
    }

    /// The version `predict` would use when no model file is given.
    pub fn serving_version(&self) -> Result<Option<ModelVersion>> {
        self.registrar().get_last_production_model()
    }

    /// Load from `model_path`, or from the registry when `None`.
    pub fn load_model(&self, model_path: Option<&Path>) -> Result<FittedModel> {
        if let Some(path) = model_path {
            return load_model_file(path);
        }

        let version = self.serving_version()?.with_context(|| {
            format!("No version of '{}' is registered yet", self.tracking.experiment_name)
        })?;
        let run_id = version
            .run_id
            .as_deref()
            .or_else(|| run_id_from_source(&version.source))
            .with_context(|| format!("Version {} does not name its run", version.version))?;

        tracing::info!("Loading {} version {} ({})", version.name, version.version, version.stage);
        let bytes = self
            .services
            .tracker
            .download_artifact(run_id, &format!("{MODEL_ARTIFACT_DIR}/{MODEL_FILE}"))?;
        FittedModel::from_json_bytes(&bytes)
    }

    /// Positive-class probability for every row of `input`.
    pub fn execute(&self, input: &Path, model_path: Option<&Path>) -> Result<Vec<f64>> {
        let model = self.load_model(model_path)?;
        let data  = load_dataset(input)?;
        predict(&model, &data)
    }
}
