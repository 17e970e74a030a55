// ============================================================
// Layer 3 — Model Version / Run Domain Types
// ============================================================
// What the registry and the tracker hand back to us.
//
// A ModelVersion is immutable except for its stage label.
// At most one version of a model should be in Production;
// keeping it that way is the registrar's job (Layer 2).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment stage of a registered model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Stage {
    #[default]
    None,
    Staging,
    Production,
    Archived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::None       => "None",
            Stage::Staging    => "Staging",
            Stage::Production => "Production",
            Stage::Archived   => "Archived",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    /// Registry stage names are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none"       => Ok(Stage::None),
            "staging"    => Ok(Stage::Staging),
            "production" => Ok(Stage::Production),
            "archived"   => Ok(Stage::Archived),
            other        => Err(anyhow::anyhow!("Unknown model stage '{other}'")),
        }
    }
}

/// One registered version of a named model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name (the experiment name in this system)
    pub name: String,

    /// Registry-assigned, monotonically increasing
    pub version: u64,

    pub stage: Stage,

    /// Where the model artifact lives, e.g. `runs:/<run_id>/models`
    pub source: String,

    /// The run that produced the artifact, when known
    pub run_id: Option<String>,
}

impl ModelVersion {
    pub fn is_production(&self) -> bool {
        self.stage == Stage::Production
    }
}

/// Lifecycle status of a tracking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running   => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished  => "FINISHED",
            RunStatus::Failed    => "FAILED",
            RunStatus::Killed    => "KILLED",
        }
    }
}

/// Summary of a tracking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id:        String,
    pub experiment_id: String,
    /// Milliseconds since the Unix epoch
    pub start_time:    i64,
    pub status:        RunStatus,
    pub artifact_uri:  String,
}

impl RunInfo {
    /// URI a registry uses to point at an artifact directory of this run.
    pub fn artifact_source(&self, artifact_path: &str) -> String {
        format!("runs:/{}/{}", self.run_id, artifact_path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trips_through_registry_names() {
        for stage in [Stage::None, Stage::Staging, Stage::Production, Stage::Archived] {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!("PRODUCTION".parse::<Stage>().unwrap(), Stage::Production);
        assert!("live".parse::<Stage>().is_err());
    }

    #[test]
    fn test_artifact_source_uses_runs_scheme() {
        let run = RunInfo {
            run_id:        "abc".to_string(),
            experiment_id: "1".to_string(),
            start_time:    0,
            status:        RunStatus::Running,
            artifact_uri:  String::new(),
        };
        assert_eq!(run.artifact_source("models"), "runs:/abc/models");
    }
}
