// ============================================================
// Layer 6 — MLflow Tracking / Registry Client
// ============================================================
// Speaks the MLflow 2.0 REST API over plain HTTP + JSON.
//
// Endpoints used (relative to {tracking_uri}/api/2.0/):
//
//   mlflow/experiments/get-by-name      GET
//   mlflow/experiments/create           POST
//   mlflow/runs/create | update | get   POST / POST / GET
//   mlflow/runs/search                  POST
//   mlflow/runs/log-parameter           POST
//   mlflow/runs/log-metric              POST
//   mlflow-artifacts/artifacts/...      PUT / GET
//   mlflow/registered-models/create     POST
//   mlflow/model-versions/create        POST
//   mlflow/model-versions/search        GET
//   mlflow/model-versions/transition-stage POST
//
// Every failure is a TrackingError, which keeps the MLflow
// error code (e.g. RESOURCE_ALREADY_EXISTS) so callers can
// branch on it.
//
// Reference: MLflow REST API documentation

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::domain::error::TrackingError;
use crate::domain::model_version::{ModelVersion, RunInfo, RunStatus, Stage};
use crate::domain::traits::{ExperimentTracker, ModelRegistry};
use crate::infra::config::TrackingConfig;
use crate::infra::http::{agent, read_body, uri_encode};

/// Tag MLflow shows as the run description.
const NOTE_TAG: &str = "mlflow.note.content";
const ARTIFACT_SCHEME: &str = "mlflow-artifacts:/";
const SEARCH_PAGE_SIZE: u32 = 1000;

// ─── Wire Types ───────────────────────────────────────────────────────────────

/// MLflow renders int64 fields either as numbers or as strings.
fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().ok_or_else(|| serde::de::Error::custom("negative number")),
        Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("expected integer, got {other}"))),
    }
}

#[derive(Deserialize)]
struct WireRunInfo {
    run_id:        String,
    experiment_id: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    start_time:    u64,
    status:        RunStatus,
    #[serde(default)]
    artifact_uri:  String,
}

impl From<WireRunInfo> for RunInfo {
    fn from(w: WireRunInfo) -> Self {
        RunInfo {
            run_id:        w.run_id,
            experiment_id: w.experiment_id,
            start_time:    i64::try_from(w.start_time).unwrap_or(i64::MAX),
            status:        w.status,
            artifact_uri:  w.artifact_uri,
        }
    }
}

#[derive(Deserialize)]
struct WireRun {
    info: WireRunInfo,
}

#[derive(Deserialize)]
struct WireModelVersion {
    name:          String,
    #[serde(deserialize_with = "lenient_u64")]
    version:       u64,
    #[serde(default)]
    current_stage: Option<String>,
    #[serde(default)]
    source:        String,
    #[serde(default)]
    run_id:        Option<String>,
}

impl WireModelVersion {
    fn into_domain(self) -> Result<ModelVersion> {
        let stage = match self.current_stage.as_deref() {
            None | Some("") => Stage::None,
            Some(s)         => s.parse()?,
        };
        Ok(ModelVersion {
            name:    self.name,
            version: self.version,
            stage,
            source:  self.source,
            run_id:  self.run_id.filter(|r| !r.is_empty()),
        })
    }
}

fn decode<T: for<'de> Deserialize<'de>>(endpoint: &str, value: Value) -> Result<T, TrackingError> {
    serde_json::from_value(value).map_err(|e| TrackingError::Decode {
        endpoint: endpoint.to_string(),
        message:  e.to_string(),
    })
}

fn field(endpoint: &str, value: &Value, name: &str) -> Result<Value, TrackingError> {
    value.get(name).cloned().ok_or_else(|| TrackingError::Decode {
        endpoint: endpoint.to_string(),
        message:  format!("missing field '{name}'"),
    })
}

/// Turn a non-2xx response body into a TrackingError.
fn api_error(endpoint: &str, status: u16, body: &str) -> TrackingError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    TrackingError::Api {
        endpoint: endpoint.to_string(),
        status,
        code:     parsed["error_code"].as_str().unwrap_or("UNKNOWN").to_string(),
        message:  parsed["message"].as_str().map_or_else(|| body.to_string(), str::to_string),
    }
}

fn map_ureq(endpoint: &str, err: ureq::Error) -> TrackingError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            api_error(endpoint, status, &body)
        }
        ureq::Error::Transport(t) => TrackingError::Transport {
            endpoint: endpoint.to_string(),
            message:  t.to_string(),
        },
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub struct MlflowClient {
    tracking_uri: String,
}

impl MlflowClient {
    pub fn new(config: &TrackingConfig) -> Self {
        Self { tracking_uri: config.tracking_uri.trim_end_matches('/').to_string() }
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.tracking_uri, endpoint)
    }

    fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, TrackingError> {
        let mut request = agent().get(&self.api_url(endpoint));
        for (k, v) in query {
            request = request.query(k, v);
        }
        tracing::debug!("MLflow GET {}", endpoint);
        let response = request.call().map_err(|e| map_ureq(endpoint, e))?;
        response.into_json().map_err(|e| TrackingError::Decode {
            endpoint: endpoint.to_string(),
            message:  e.to_string(),
        })
    }

    fn post(&self, endpoint: &str, body: Value) -> Result<Value, TrackingError> {
        tracing::debug!("MLflow POST {}", endpoint);
        let response = agent()
            .post(&self.api_url(endpoint))
            .send_json(body)
            .map_err(|e| map_ureq(endpoint, e))?;
        let text = response.into_string().map_err(|e| TrackingError::Decode {
            endpoint: endpoint.to_string(),
            message:  e.to_string(),
        })?;
        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&text).map_err(|e| TrackingError::Decode {
            endpoint: endpoint.to_string(),
            message:  e.to_string(),
        })
    }

    fn get_run(&self, run_id: &str) -> Result<RunInfo, TrackingError> {
        let endpoint = "runs/get";
        let body     = self.get(endpoint, &[("run_id", run_id)])?;
        let run: WireRun = decode(endpoint, field(endpoint, &body, "run")?)?;
        Ok(run.info.into())
    }

    /// HTTP URL of an artifact, resolved from the run's
    /// `mlflow-artifacts:/<exp>/<run>/artifacts` root.
    fn artifact_url(&self, run_id: &str, path: &str) -> Result<String, TrackingError> {
        let info = self.get_run(run_id)?;
        let root = info
            .artifact_uri
            .strip_prefix(ARTIFACT_SCHEME)
            .map(|r| r.trim_start_matches('/').to_string())
            .unwrap_or_else(|| format!("{}/{}/artifacts", info.experiment_id, info.run_id));
        Ok(format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}",
            self.tracking_uri,
            root,
            uri_encode(path.trim_start_matches('/'), true)
        ))
    }
}

impl ExperimentTracker for MlflowClient {
    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        let endpoint = "experiments/get-by-name";
        match self.get(endpoint, &[("experiment_name", name)]) {
            Ok(body) => {
                let id = field(endpoint, &body, "experiment")?["experiment_id"].clone();
                Ok(decode::<String>(endpoint, id)?)
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("Creating experiment '{}'", name);
                let endpoint = "experiments/create";
                let body     = self.post(endpoint, json!({ "name": name }))?;
                Ok(decode::<String>(endpoint, field(endpoint, &body, "experiment_id")?)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn start_run(
        &self,
        experiment_id: &str,
        description:   &str,
        tags:          &BTreeMap<String, String>,
    ) -> Result<RunInfo> {
        let mut wire_tags: Vec<Value> = tags
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        wire_tags.push(json!({ "key": NOTE_TAG, "value": description }));

        let endpoint = "runs/create";
        let body = self.post(
            endpoint,
            json!({
                "experiment_id": experiment_id,
                "start_time":    Utc::now().timestamp_millis(),
                "tags":          wire_tags,
            }),
        )?;
        let run: WireRun = decode(endpoint, field(endpoint, &body, "run")?)?;
        Ok(run.info.into())
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.post("runs/log-parameter", json!({ "run_id": run_id, "key": key, "value": value }))?;
        Ok(())
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.post(
            "runs/log-metric",
            json!({
                "run_id":    run_id,
                "key":       key,
                "value":     value,
                "timestamp": Utc::now().timestamp_millis(),
                "step":      0,
            }),
        )?;
        Ok(())
    }

    fn log_artifact(&self, run_id: &str, path: &str, bytes: &[u8]) -> Result<String> {
        let url = self.artifact_url(run_id, path)?;
        agent()
            .put(&url)
            .set("Content-Type", "application/octet-stream")
            .send_bytes(bytes)
            .map_err(|e| map_ureq("mlflow-artifacts/artifacts", e))?;
        tracing::debug!("Uploaded artifact '{}' ({} bytes)", path, bytes.len());
        Ok(url)
    }

    fn download_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>> {
        let url      = self.artifact_url(run_id, path)?;
        let response = agent()
            .get(&url)
            .call()
            .map_err(|e| map_ureq("mlflow-artifacts/artifacts", e))?;
        read_body(response)
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.post(
            "runs/update",
            json!({
                "run_id":   run_id,
                "status":   status.as_str(),
                "end_time": Utc::now().timestamp_millis(),
            }),
        )?;
        Ok(())
    }

    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunInfo>> {
        let endpoint = "runs/search";
        let body = self.post(
            endpoint,
            json!({
                "experiment_ids": [experiment_id],
                "order_by":       ["attributes.start_time DESC"],
                "max_results":    SEARCH_PAGE_SIZE,
            }),
        )?;
        let runs: Vec<WireRun> = match body.get("runs") {
            Some(runs) => decode(endpoint, runs.clone())?,
            None       => Vec::new(),
        };
        let mut runs: Vec<RunInfo> = runs.into_iter().map(|r| r.info.into()).collect();
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(runs)
    }
}

impl ModelRegistry for MlflowClient {
    fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion> {
        match self.post("registered-models/create", json!({ "name": name })) {
            Ok(_) => tracing::info!("Registered new model '{}'", name),
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e.into()),
        }

        let endpoint = "model-versions/create";
        let body = self.post(
            endpoint,
            json!({ "name": name, "source": source, "run_id": run_id }),
        )?;
        decode::<WireModelVersion>(endpoint, field(endpoint, &body, "model_version")?)?.into_domain()
    }

    fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        let endpoint = "model-versions/search";
        let filter   = format!("name='{}'", name.replace('\'', "\\'"));
        let body     = self.get(endpoint, &[("filter", filter.as_str())])?;
        let wire: Vec<WireModelVersion> = match body.get("model_versions") {
            Some(v) => decode(endpoint, v.clone())?,
            None    => Vec::new(),
        };
        let mut versions = wire
            .into_iter()
            .map(WireModelVersion::into_domain)
            .collect::<Result<Vec<_>>>()?;
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    fn transition_stage(&self, name: &str, version: u64, stage: Stage) -> Result<ModelVersion> {
        let endpoint = "model-versions/transition-stage";
        let body = self.post(
            endpoint,
            json!({
                "name":                      name,
                "version":                   version.to_string(),
                "stage":                     stage.as_str(),
                "archive_existing_versions": false,
            }),
        )?;
        decode::<WireModelVersion>(endpoint, field(endpoint, &body, "model_version")?)?.into_domain()
    }
}
