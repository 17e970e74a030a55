// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one tracked training run, in order:
//
//   Step 1: Start a run with the configured tags   (Layer 6 - tracker)
//   Step 2: Log the model parameters               (Layer 6 - tracker)
//   Step 3: Download, label, split, validate       (Layer 4 - data)
//   Step 4: Grid search + refit, score             (Layer 5 - ml)
//   Step 5: Log metrics, model, CV results         (Layer 6 - tracker)
//   Step 6: Register and promote the model         (Layer 2 - registrar)
//   Step 7: Drift and quality reports              (Layer 6 - reports)
//   Step 8: End the run FINISHED (or FAILED)
//
// Registry changes made before a failure are not rolled back;
// the run is simply marked FAILED.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use crate::application::registrar::{ModelRegistrar, MODEL_ARTIFACT_DIR};
use crate::application::services::Services;
use crate::data::{
    labeler::derive_output_column,
    loader::load_dataset,
    splitter::split_dataset,
    validator::validate_splits,
};
use crate::domain::model_version::{ModelVersion, RunInfo, RunStatus};
use crate::domain::record::Dataset;
use crate::infra::{
    checkpoint::{CheckpointManager, MODEL_FILE},
    config::{Settings, TrackingConfig},
    metrics::write_cv_results,
    reports::{generate_quality_reports, QualityContext, QualityReport, ReportPublisher},
};
use crate::ml::{
    evaluator::{calculate_metrics, ModelMetrics},
    model::FittedModel,
    trainer::create_model,
};

pub const RUN_DESCRIPTION: &str = "Laundering model experiment description.";
pub const CV_RESULTS_ARTIFACT: &str = "grid_search/cv_results.csv";
pub const REPORTS_ARTIFACT_DIR: &str = "reports";

/// What a successful run leaves behind.
#[derive(Debug)]
pub struct TrainOutcome {
    pub run_id:        String,
    pub metrics:       ModelMetrics,
    pub model_version: ModelVersion,
    pub quality:       QualityReport,
}

/// Removes the downloaded dump when dropped, on success and on
/// every error path alike.
struct DownloadGuard(PathBuf);

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        if self.0.exists() {
            match fs::remove_file(&self.0) {
                Ok(())   => tracing::debug!("Removed downloaded file '{}'", self.0.display()),
                Err(err) => tracing::warn!("Cannot remove '{}': {}", self.0.display(), err),
            }
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    settings: Settings,
    tracking: TrackingConfig,
    services: Services,
}

impl TrainUseCase {
    pub fn new(settings: Settings, services: Services) -> Self {
        let tracking = settings.tracking_config();
        Self { settings, tracking, services }
    }

    /// Fetch the raw dump and turn it into validated train and
    /// test partitions. The local download is always removed.
    pub fn generate_data(&self) -> Result<(Dataset, Dataset)> {
        let conn   = &self.settings.connection;
        let params = &self.settings.model;

        let guard = DownloadGuard(conn.path_to.clone());
        self.services.store.download(&conn.path_from, &guard.0)?;

        let mut data = load_dataset(&guard.0)?;
        derive_output_column(&mut data, &params.target_column, &params.condition_value, &params.output_column);

        let (train, test) = split_dataset(data, params.test_size, params.random_state);
        if let Err(err) = validate_splits(&train, &test) {
            tracing::error!("{}", err);
            return Err(err.into());
        }
        tracing::info!("Split: {} train, {} test", train.len(), test.len());

        drop(guard);
        Ok((train, test))
    }

    /// Grid search, refit and score on both partitions.
    pub fn train_model(
        &self,
        train:     &Dataset,
        test:      &Dataset,
        publisher: &ReportPublisher,
    ) -> Result<(FittedModel, ModelMetrics)> {
        let params = &self.settings.model;
        let spec   = params.feature_spec();

        tracing::info!("Hyperparameter grid: {:?}", params.hyperparameters);
        let model = create_model(train, &spec, &params.hyperparameters, &params.output_column, params.cv_folds)?;

        let metrics = calculate_metrics(&model, train, test, &spec, &params.output_column, publisher)?;
        tracing::info!(
            "ROC-AUC train {:.4}, test {:.4} (best CV {:.4})",
            metrics.train_auc,
            metrics.test_auc,
            model.best_score
        );
        Ok((model, metrics))
    }

    /// Run the whole flow inside one tracked run.
    pub fn execute(&self) -> Result<TrainOutcome> {
        let tracker       = self.services.tracker.as_ref();
        let experiment_id = tracker.get_or_create_experiment(&self.tracking.experiment_name)?;
        let run           = tracker.start_run(&experiment_id, RUN_DESCRIPTION, &self.settings.model.tags)?;
        tracing::info!(
            "Run {} started in experiment '{}' ({})",
            run.run_id,
            self.tracking.experiment_name,
            self.tracking.tracking_uri
        );

        match self.run_steps(&run) {
            Ok(outcome) => {
                tracker.end_run(&run.run_id, RunStatus::Finished)?;
                tracing::info!("Run {} finished", run.run_id);
                Ok(outcome)
            }
            Err(err) => {
                tracing::error!("Run {} failed: {:#}", run.run_id, err);
                if let Err(end_err) = tracker.end_run(&run.run_id, RunStatus::Failed) {
                    tracing::warn!("Cannot mark run {} as failed: {:#}", run.run_id, end_err);
                }
                Err(err)
            }
        }
    }

    fn run_steps(&self, run: &RunInfo) -> Result<TrainOutcome> {
        let tracker = self.services.tracker.as_ref();
        let conn    = &self.settings.connection;
        let params  = &self.settings.model;
        let run_id  = run.run_id.as_str();

        tracker.log_params(run_id, &params.as_run_params()?)?;

        let (train, test) = self.generate_data()?;

        let publisher        = ReportPublisher::new(&conn.reports_dir)?;
        let (model, metrics) = self.train_model(&train, &test, &publisher)?;

        tracker.log_metric(run_id, "train_roc_auc", metrics.train_auc)?;
        tracker.log_metric(run_id, "test_roc_auc", metrics.test_auc)?;
        tracker.log_metric(run_id, "cv_best_roc_auc", model.best_score)?;

        let model_bytes = CheckpointManager::new(&conn.model_dir)?.save_model(&model)?;
        tracker.log_artifact(run_id, &format!("{MODEL_ARTIFACT_DIR}/{MODEL_FILE}"), &model_bytes)?;

        let cv_csv = write_cv_results(&conn.reports_dir.join("cv_results.csv"), &model.cv_results)?;
        tracker.log_artifact(run_id, CV_RESULTS_ARTIFACT, cv_csv.as_bytes())?;

        let registrar     = ModelRegistrar::new(tracker, self.services.registry.as_ref(), &self.tracking);
        let model_version = registrar.register_model()?;

        let spec = params.feature_spec();
        let ctx  = QualityContext {
            features:      &spec,
            output_column: &params.output_column,
            train_auc:     metrics.train_auc,
            test_auc:      metrics.test_auc,
            run_id,
            model_version: model_version.version,
        };
        let quality = generate_quality_reports(&train, &test, &ctx, &publisher)?;

        for path in publisher.published() {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let bytes = fs::read(&path)?;
            tracker.log_artifact(run_id, &format!("{REPORTS_ARTIFACT_DIR}/{file_name}"), &bytes)?;
        }

        Ok(TrainOutcome {
            run_id: run.run_id.clone(),
            metrics,
            model_version,
            quality,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::domain::error::DataError;
    use crate::domain::model_version::Stage;
    use crate::domain::traits::{ExperimentTracker, ModelRegistry};
    use crate::infra::config::{StorageBackend, TrackingBackend};
    use crate::infra::local_tracker::LocalTracker;
    use crate::ml::grid_search::HyperparameterGrid;

    fn transactions(n: usize) -> Value {
        let rows: Vec<Value> = (0..n)
            .map(|i| {
                let laundering = i % 2 == 0;
                let amount     = if laundering { 5000.0 } else { 50.0 } + i as f64;
                let format     = if laundering { "Bitcoin" } else if i % 4 == 1 { "ACH" } else { "Cheque" };
                let currency   = if i % 3 == 0 { "US Dollar" } else { "Euro" };
                let receiving  = if i % 5 == 0 { Value::Null } else { json!("US Dollar") };
                let status     = if laundering { "laundering" } else { "legitimate" };
                json!({
                    "amount_paid":        amount,
                    "amount_received":    amount * 0.98,
                    "payment_format":     format,
                    "payment_currency":   currency,
                    "receiving_currency": receiving,
                    "transaction_status": status,
                })
            })
            .collect();
        Value::Array(rows)
    }

    struct Fixture {
        dir:      tempfile::TempDir,
        settings: Settings,
    }

    fn fixture(payload: &Value) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        {
            let conn = &mut settings.connection;
            conn.storage_backend  = StorageBackend::Local;
            conn.tracking_backend = TrackingBackend::Local;
            conn.storage_dir      = dir.path().join("storage");
            conn.tracking_dir     = dir.path().join("mlruns");
            conn.reports_dir      = dir.path().join("reports");
            conn.model_dir        = dir.path().join("models");
            conn.bucket           = "bucket".to_string();
            conn.path_from        = "raw/transactions.json".to_string();
            conn.path_to          = dir.path().join("work/transactions.json");
        }
        settings.model.random_state    = Some(42);
        settings.model.cv_folds        = 3;
        settings.model.hyperparameters = HyperparameterGrid {
            n_estimators: vec![5, 10],
            max_depth:    vec![2],
            ..Default::default()
        };

        let object = dir.path().join("storage/bucket/raw/transactions.json");
        fs::create_dir_all(object.parent().unwrap()).unwrap();
        fs::write(&object, serde_json::to_vec(payload).unwrap()).unwrap();
        Fixture { dir, settings }
    }

    fn use_case(f: &Fixture) -> TrainUseCase {
        let services = Services::from_settings(&f.settings).unwrap();
        TrainUseCase::new(f.settings.clone(), services)
    }

    fn is_two_decimals(cell: &str) -> bool {
        let cell = cell.trim();
        cell.len() == 4 && cell.as_bytes()[1] == b'.' && cell.replace('.', "").chars().all(|c| c.is_ascii_digit())
    }

    #[test]
    fn test_end_to_end_run_registers_production_model() {
        let f       = fixture(&transactions(100));
        let outcome = use_case(&f).execute().unwrap();

        // AUC report with two 2-decimal values
        let report = fs::read_to_string(f.dir.path().join("reports/laundering-model-report.md")).unwrap();
        let row    = report.lines().last().unwrap();
        let cells: Vec<&str> = row.split('|').map(str::trim).filter(|c| !c.is_empty()).collect();
        assert_eq!(cells.len(), 3);
        assert!(is_two_decimals(cells[1]), "train cell {:?}", cells[1]);
        assert!(is_two_decimals(cells[2]), "test cell {:?}", cells[2]);

        // New version is the only one in Production
        assert_eq!(outcome.model_version.stage, Stage::Production);
        let tracker  = LocalTracker::new(f.dir.path().join("mlruns")).unwrap();
        let versions = tracker.search_model_versions("laundering-money-model").unwrap();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].is_production());

        // Run bookkeeping
        let record = tracker.run_record(&outcome.run_id).unwrap();
        assert_eq!(record.info.status, RunStatus::Finished);
        assert_eq!(record.description, RUN_DESCRIPTION);
        assert_eq!(record.tags["owner_team"], "credits");
        assert_eq!(record.params["target_column"], "transaction_status");
        assert!(record.metrics.contains_key("train_roc_auc"));
        assert!(record.metrics.contains_key("test_roc_auc"));
        assert!(record.artifacts.contains(&"models/model.json".to_string()));
        assert!(record.artifacts.contains(&CV_RESULTS_ARTIFACT.to_string()));
        assert!(record.artifacts.contains(&"reports/laundering-quality-report.md".to_string()));

        assert!((0.0..=1.0).contains(&outcome.metrics.train_auc));
        assert!((0.0..=1.0).contains(&outcome.metrics.test_auc));

        // Downloaded dump is gone
        assert!(!f.settings.connection.path_to.exists());
    }

    #[test]
    fn test_generate_data_splits_and_labels() {
        let f = fixture(&transactions(100));
        let (train, test) = use_case(&f).generate_data().unwrap();
        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 80);
        assert!(train.has_column("is_laundering"));
        assert!(!f.settings.connection.path_to.exists());
    }

    #[test]
    fn test_empty_download_fails_and_is_removed() {
        let f   = fixture(&json!([]));
        let err = use_case(&f).generate_data().unwrap_err();
        let data_err = err.downcast_ref::<DataError>().unwrap();
        assert!(matches!(data_err, DataError::InvalidPartitions(failures) if failures.len() == 2));
        assert!(!f.settings.connection.path_to.exists());
    }

    #[test]
    fn test_failed_run_is_marked_failed() {
        let f     = fixture(&json!([]));
        let uc    = use_case(&f);
        assert!(uc.execute().is_err());

        let tracker = LocalTracker::new(f.dir.path().join("mlruns")).unwrap();
        let exp     = tracker.get_or_create_experiment("laundering-money-model").unwrap();
        let runs    = tracker.search_runs(&exp).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
    }
}
