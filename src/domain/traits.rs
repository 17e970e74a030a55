// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The three outside services this system talks to, each behind
// a trait so the application layer never sees HTTP or files:
//
//   ObjectStore        — where the raw transaction dump lives
//   ExperimentTracker  — runs, params, metrics, artifacts
//   ModelRegistry      — registered model versions and stages
//
// Implementations (Layer 6):
//   S3ObjectStore / LocalObjectStore
//   MlflowClient  (tracker + registry over the MLflow REST API)
//   LocalTracker  (tracker + registry in a local directory)
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Trait Objects)

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use crate::domain::model_version::{ModelVersion, RunInfo, RunStatus, Stage};

// ─── ObjectStore ──────────────────────────────────────────────────────────────
/// A source of serialized datasets.
pub trait ObjectStore {
    /// Fetch the object named by `key` and write it to `destination`.
    /// Returns the number of bytes written.
    fn download(&self, key: &str, destination: &Path) -> Result<u64>;
}

// ─── ExperimentTracker ────────────────────────────────────────────────────────
/// Records what happened during a training run.
pub trait ExperimentTracker {
    /// Look up an experiment by name, creating it if needed.
    /// Returns the experiment id.
    fn get_or_create_experiment(&self, name: &str) -> Result<String>;

    fn start_run(
        &self,
        experiment_id: &str,
        description:   &str,
        tags:          &BTreeMap<String, String>,
    ) -> Result<RunInfo>;

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()>;

    /// Store `bytes` at `path` (relative, `/`-separated) under the
    /// run's artifact root. Returns the artifact's URI.
    fn log_artifact(&self, run_id: &str, path: &str, bytes: &[u8]) -> Result<String>;

    fn download_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>>;

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()>;

    /// Runs of an experiment, most recent first.
    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>>;

    fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in params {
            self.log_param(run_id, key, value)?;
        }
        Ok(())
    }
}

// ─── ModelRegistry ────────────────────────────────────────────────────────────
/// Versioned storage of trained models with a stage label each.
pub trait ModelRegistry {
    /// Register the artifact at `source` as a new version of `name`.
    /// Creates the registered model on first use.
    fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion>;

    /// All versions of `name`, highest version first.
    fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>>;

    fn transition_stage(&self, name: &str, version: u64, stage: Stage) -> Result<ModelVersion>;
}
