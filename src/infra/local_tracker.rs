// ============================================================
// Layer 6 — Local Tracker
// ============================================================
// A file-backed stand-in for the tracking server, used for
// offline runs and tests. It implements both ExperimentTracker
// and ModelRegistry.
//
// Layout:
//
//   <root>/
//     state.json               ← experiments, runs, params,
//                                metrics, registered versions
//     artifacts/<run_id>/...   ← logged artifacts
//
// Every mutation is load → modify → write `state.json.tmp` →
// rename over `state.json`, under an in-process lock, so a
// reader never sees a half-written state file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::model_version::{ModelVersion, RunInfo, RunStatus, Stage};
use crate::domain::traits::{ExperimentTracker, ModelRegistry};

const STATE_FILE: &str = "state.json";

/// Everything recorded about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub info:        RunInfo,
    pub description: String,
    pub tags:        BTreeMap<String, String>,
    pub params:      BTreeMap<String, String>,
    /// Last value logged per key
    pub metrics:     BTreeMap<String, f64>,
    pub artifacts:   Vec<String>,
    pub end_time:    Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerState {
    /// name → id
    experiments: BTreeMap<String, String>,
    runs:        Vec<RunRecord>,
    /// model name → versions in creation order
    models:      BTreeMap<String, Vec<ModelVersion>>,
}

impl TrackerState {
    fn run_mut(&mut self, run_id: &str) -> Result<&mut RunRecord> {
        match self.runs.iter_mut().find(|r| r.info.run_id == run_id) {
            Some(run) => Ok(run),
            None      => bail!("Run '{run_id}' not found"),
        }
    }
}

pub struct LocalTracker {
    root: PathBuf,
    lock: Mutex<()>,
}

fn new_run_id() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

/// Reject absolute paths and `..` so artifacts stay inside the run.
fn check_relative(path: &str) -> Result<&Path> {
    let p = Path::new(path);
    if path.is_empty() || p.components().any(|c| !matches!(c, Component::Normal(_))) {
        bail!("Artifact path '{path}' must be relative and stay inside the run");
    }
    Ok(p)
}

impl LocalTracker {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("artifacts"))
            .with_context(|| format!("Cannot create tracking directory '{}'", root.display()))?;
        Ok(Self { root, lock: Mutex::new(()) })
    }

    fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("artifacts").join(run_id)
    }

    fn load(&self) -> Result<TrackerState> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(TrackerState::default());
        }
        let bytes = fs::read(&path).with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("Corrupt tracker state '{}'", path.display()))
    }

    fn save(&self, state: &TrackerState) -> Result<()> {
        let path = self.state_path();
        let tmp  = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)
            .with_context(|| format!("Cannot write '{}'", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Cannot replace '{}'", path.display()))
    }

    fn read<T>(&self, f: impl FnOnce(&TrackerState) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        f(&self.load()?)
    }

    fn update<T>(&self, f: impl FnOnce(&mut TrackerState) -> Result<T>) -> Result<T> {
        let _guard    = self.lock.lock();
        let mut state = self.load()?;
        let out       = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }

    /// Full record of one run.
    #[cfg(test)]
    pub fn run_record(&self, run_id: &str) -> Result<RunRecord> {
        self.read(|state| {
            state
                .runs
                .iter()
                .find(|r| r.info.run_id == run_id)
                .cloned()
                .with_context(|| format!("Run '{run_id}' not found"))
        })
    }
}

impl ExperimentTracker for LocalTracker {
    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        self.update(|state| {
            let next_id = state.experiments.len().to_string();
            Ok(state.experiments.entry(name.to_string()).or_insert(next_id).clone())
        })
    }

    fn start_run(
        &self,
        experiment_id: &str,
        description:   &str,
        tags:          &BTreeMap<String, String>,
    ) -> Result<RunInfo> {
        let run_id = new_run_id();
        let info   = RunInfo {
            artifact_uri:  self.run_dir(&run_id).display().to_string(),
            run_id,
            experiment_id: experiment_id.to_string(),
            start_time:    Utc::now().timestamp_millis(),
            status:        RunStatus::Running,
        };
        self.update(|state| {
            if !state.experiments.values().any(|id| id == experiment_id) {
                bail!("Experiment '{experiment_id}' not found");
            }
            state.runs.push(RunRecord {
                info:        info.clone(),
                description: description.to_string(),
                tags:        tags.clone(),
                params:      BTreeMap::new(),
                metrics:     BTreeMap::new(),
                artifacts:   Vec::new(),
                end_time:    None,
            });
            Ok(())
        })?;
        tracing::info!("Started local run {}", info.run_id);
        Ok(info)
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.update(|state| {
            state.run_mut(run_id)?.params.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.update(|state| {
            state.run_mut(run_id)?.metrics.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn log_artifact(&self, run_id: &str, path: &str, bytes: &[u8]) -> Result<String> {
        let relative = check_relative(path)?;
        let target   = self.run_dir(run_id).join(relative);
        self.update(|state| {
            let run = state.run_mut(run_id)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, bytes).with_context(|| format!("Cannot write '{}'", target.display()))?;
            if !run.artifacts.iter().any(|a| a == path) {
                run.artifacts.push(path.to_string());
            }
            Ok(())
        })?;
        Ok(target.display().to_string())
    }

    fn download_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>> {
        let target = self.run_dir(run_id).join(check_relative(path)?);
        fs::read(&target).with_context(|| format!("Artifact '{path}' not found in run '{run_id}'"))
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.update(|state| {
            let run = state.run_mut(run_id)?;
            run.info.status = status;
            run.end_time    = Some(Utc::now().timestamp_millis());
            Ok(())
        })
    }

    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>> {
        self.read(|state| {
            // Later runs first among equal start times
            let mut runs: Vec<RunInfo> = state
                .runs
                .iter()
                .rev()
                .filter(|r| r.info.experiment_id == experiment_id)
                .map(|r| r.info.clone())
                .collect();
            runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
            Ok(runs)
        })
    }
}

impl ModelRegistry for LocalTracker {
    fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion> {
        self.update(|state| {
            let versions = state.models.entry(name.to_string()).or_default();
            let next     = versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
            let mv = ModelVersion {
                name:    name.to_string(),
                version: next,
                stage:   Stage::None,
                source:  source.to_string(),
                run_id:  Some(run_id.to_string()),
            };
            versions.push(mv.clone());
            Ok(mv)
        })
    }

    fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        self.read(|state| {
            let mut versions = state.models.get(name).cloned().unwrap_or_default();
            versions.sort_by(|a, b| b.version.cmp(&a.version));
            Ok(versions)
        })
    }

    fn transition_stage(&self, name: &str, version: u64, stage: Stage) -> Result<ModelVersion> {
        self.update(|state| {
            let mv = state
                .models
                .get_mut(name)
                .and_then(|vs| vs.iter_mut().find(|v| v.version == version))
                .with_context(|| format!("Model '{name}' has no version {version}"))?;
            mv.stage = stage;
            Ok(mv.clone())
        })
    }
}
