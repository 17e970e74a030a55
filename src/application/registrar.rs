// ============================================================
// Layer 2 — Model Registrar
// ============================================================
// Keeps exactly one version of the model in Production:
//
//   1. find the most recent run of the experiment
//   2. register `runs:/<run_id>/models` as a new version
//   3. promote the new version to Production
//   4. demote every other Production version to None
//
// Demotion is best effort: a failed transition is logged and
// the new version stays registered and promoted.
//
// Registrations inside this process are serialized by a lock,
// so two registrations can never interleave their promote and
// demote steps. Another process talking to the same registry
// can still race with us.

use anyhow::{bail, Result};
use parking_lot::Mutex;

use crate::domain::model_version::{ModelVersion, Stage};
use crate::domain::traits::{ExperimentTracker, ModelRegistry};
use crate::infra::config::TrackingConfig;

/// Run artifact directory a model version points at.
pub const MODEL_ARTIFACT_DIR: &str = "models";

static REGISTRY_LOCK: Mutex<()> = parking_lot::const_mutex(());

pub struct ModelRegistrar<'a> {
    tracker:  &'a dyn ExperimentTracker,
    registry: &'a dyn ModelRegistry,
    config:   &'a TrackingConfig,
}

impl<'a> ModelRegistrar<'a> {
    pub fn new(
        tracker:  &'a dyn ExperimentTracker,
        registry: &'a dyn ModelRegistry,
        config:   &'a TrackingConfig,
    ) -> Self {
        Self { tracker, registry, config }
    }

    fn model_name(&self) -> &str {
        &self.config.experiment_name
    }

    /// The version currently serving: the Production version if
    /// there is one, otherwise the highest version. `None` only
    /// when nothing has been registered yet.
    pub fn get_last_production_model(&self) -> Result<Option<ModelVersion>> {
        let versions = self.registry.search_model_versions(self.model_name())?;
        let Some(latest) = versions.first().cloned() else {
            return Ok(None);
        };
        Ok(Some(versions.into_iter().find(ModelVersion::is_production).unwrap_or(latest)))
    }

    /// Register the latest run's model and make it the only
    /// Production version.
    pub fn register_model(&self) -> Result<ModelVersion> {
        let _guard = REGISTRY_LOCK.lock();
        let name   = self.model_name();

        let experiment_id = self.tracker.get_or_create_experiment(name)?;
        let runs          = self.tracker.search_runs(&experiment_id)?;
        let Some(run)     = runs.first() else {
            bail!("Experiment '{name}' has no runs to register");
        };

        let previous: Vec<ModelVersion> = self
            .registry
            .search_model_versions(name)?
            .into_iter()
            .filter(ModelVersion::is_production)
            .collect();

        let source  = run.artifact_source(MODEL_ARTIFACT_DIR);
        let created = self.registry.create_model_version(name, &source, &run.run_id)?;
        tracing::info!("Registered {} version {} from {}", name, created.version, source);

        let promoted = self.registry.transition_stage(name, created.version, Stage::Production)?;

        for old in previous.iter().filter(|v| v.version != created.version) {
            match self.registry.transition_stage(name, old.version, Stage::None) {
                Ok(_) => tracing::info!("Demoted {} version {} from Production", name, old.version),
                Err(err) => tracing::warn!(
                    "Could not demote {} version {} from Production: {:#}",
                    name,
                    old.version,
                    err
                ),
            }
        }

        Ok(promoted)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::thread;

    use crate::infra::local_tracker::LocalTracker;

    /// Registry whose demotions to None always fail.
    struct FailingDemotion<'a>(&'a LocalTracker);

    impl ModelRegistry for FailingDemotion<'_> {
        fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion> {
            self.0.create_model_version(name, source, run_id)
        }

        fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
            self.0.search_model_versions(name)
        }

        fn transition_stage(&self, name: &str, version: u64, stage: Stage) -> Result<ModelVersion> {
            if stage == Stage::None {
                bail!("registry unavailable");
            }
            self.0.transition_stage(name, version, stage)
        }
    }

    fn config() -> TrackingConfig {
        TrackingConfig {
            tracking_uri:    "http://localhost:5000".to_string(),
            experiment_name: "laundering-money-model".to_string(),
        }
    }

    fn start_run(t: &LocalTracker) -> String {
        let exp = t.get_or_create_experiment("laundering-money-model").unwrap();
        t.start_run(&exp, "", &BTreeMap::new()).unwrap().run_id
    }

    fn production_versions(t: &LocalTracker) -> Vec<u64> {
        t.search_model_versions("laundering-money-model")
            .unwrap()
            .into_iter()
            .filter(ModelVersion::is_production)
            .map(|v| v.version)
            .collect()
    }

    #[test]
    fn test_no_versions_means_no_production_model() {
        let dir = tempfile::tempdir().unwrap();
        let t   = LocalTracker::new(dir.path()).unwrap();
        let cfg = config();
        assert_eq!(ModelRegistrar::new(&t, &t, &cfg).get_last_production_model().unwrap(), None);
    }

    #[test]
    fn test_highest_version_when_none_in_production() {
        let dir = tempfile::tempdir().unwrap();
        let t   = LocalTracker::new(dir.path()).unwrap();
        for run in ["a", "b", "c"] {
            t.create_model_version("laundering-money-model", "runs:/x/models", run).unwrap();
        }
        let cfg  = config();
        let last = ModelRegistrar::new(&t, &t, &cfg).get_last_production_model().unwrap().unwrap();
        assert_eq!(last.version, 3);
        assert!(!last.is_production());
    }

    #[test]
    fn test_production_version_wins_over_newer_versions() {
        let dir = tempfile::tempdir().unwrap();
        let t   = LocalTracker::new(dir.path()).unwrap();
        for run in ["a", "b", "c"] {
            t.create_model_version("laundering-money-model", "runs:/x/models", run).unwrap();
        }
        t.transition_stage("laundering-money-model", 2, Stage::Production).unwrap();
        let cfg  = config();
        let last = ModelRegistrar::new(&t, &t, &cfg).get_last_production_model().unwrap().unwrap();
        assert_eq!(last.version, 2);
    }

    #[test]
    fn test_register_promotes_new_and_demotes_previous() {
        let dir = tempfile::tempdir().unwrap();
        let t   = LocalTracker::new(dir.path()).unwrap();
        let cfg = config();
        let registrar = ModelRegistrar::new(&t, &t, &cfg);

        let first_run = start_run(&t);
        let v1 = registrar.register_model().unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v1.source, format!("runs:/{first_run}/models"));
        assert_eq!(production_versions(&t), vec![1]);

        start_run(&t);
        let v2 = registrar.register_model().unwrap();
        assert!(v2.is_production());
        assert_eq!(production_versions(&t), vec![2]);
        assert_eq!(registrar.get_last_production_model().unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_first_registration_stays_in_production() {
        let dir = tempfile::tempdir().unwrap();
        let t   = LocalTracker::new(dir.path()).unwrap();
        let cfg = config();
        start_run(&t);
        ModelRegistrar::new(&t, &t, &cfg).register_model().unwrap();
        assert_eq!(production_versions(&t), vec![1]);
    }

    #[test]
    fn test_failed_demotion_keeps_new_version_in_production() {
        let dir = tempfile::tempdir().unwrap();
        let t   = LocalTracker::new(dir.path()).unwrap();
        let cfg = config();
        let failing   = FailingDemotion(&t);
        let registrar = ModelRegistrar::new(&t, &failing, &cfg);

        start_run(&t);
        registrar.register_model().unwrap();
        start_run(&t);
        let v2 = registrar.register_model().unwrap();

        assert_eq!(v2.version, 2);
        assert!(v2.is_production());
        // Version 1 could not be demoted and keeps its stage
        assert_eq!(production_versions(&t), vec![2, 1]);
        assert_eq!(registrar.get_last_production_model().unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_register_without_runs_fails() {
        let dir = tempfile::tempdir().unwrap();
        let t   = LocalTracker::new(dir.path()).unwrap();
        let cfg = config();
        assert!(ModelRegistrar::new(&t, &t, &cfg).register_model().is_err());
    }

    #[test]
    fn test_concurrent_registrations_leave_one_production_version() {
        let dir = tempfile::tempdir().unwrap();
        let t   = LocalTracker::new(dir.path()).unwrap();
        let cfg = config();
        start_run(&t);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| ModelRegistrar::new(&t, &t, &cfg).register_model().unwrap());
            }
        });

        assert_eq!(production_versions(&t), vec![4]);
    }
}
