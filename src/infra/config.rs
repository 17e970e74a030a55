// ============================================================
// Layer 6 — Configuration
// ============================================================
// Settings are resolved in four passes, later passes winning:
//
//   1. built-in defaults (below)
//   2. TOML settings file      — `[connection]` and `[model]`
//   3. `.env` file             — connection keys only
//   4. process environment     — connection keys only
//
// The `.env` file is read into a map; it never mutates the
// process environment.
//
// Example settings file:
//
//   [connection]
//   tracking_backend = "local"
//   storage_backend  = "local"
//
//   [model]
//   target_column   = "transaction_status"
//   condition_value = "legitimate"
//   test_size       = 0.2
//
//   [model.hyperparameters]
//   n_estimators = [50, 100]
//   max_depth    = [3, 5]
//   subsample    = [0.8, 1.0]
//
// Reference: Rust Book §12 (Accepting Command Line Arguments)
//            The Twelve-Factor App §III (Config)

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::{env, fmt, fs};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ml::features::FeatureSpec;
use crate::ml::grid_search::HyperparameterGrid;
use crate::ml::trainer::DEFAULT_CV_FOLDS;

pub const DEFAULT_TRACKING_HOST: &str = "test_tracking_server";
pub const TRACKING_PORT: u16 = 5000;
pub const DEFAULT_EXPERIMENT_NAME: &str = "laundering-money-model";
pub const DEFAULT_ENV_FILE: &str = ".env";

// ─── Backends ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackingBackend {
    #[default]
    Mlflow,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Local,
}

fn parse_backend<T: for<'de> Deserialize<'de>>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase()))
        .with_context(|| format!("Invalid value '{raw}' for {key}"))
}

// ─── Connection Settings ──────────────────────────────────────────────────────

/// Where the services live and how to reach them.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub tracking_server_host: String,
    pub tracking_backend:     TrackingBackend,
    /// Root of the local tracker
    pub tracking_dir:         PathBuf,
    pub aws_key:              String,
    pub aws_secret:           String,
    pub aws_region:           String,
    /// Custom S3-compatible endpoint; AWS when unset
    pub s3_endpoint:          Option<String>,
    pub bucket:               String,
    /// Object key of the raw dataset
    pub path_from:            String,
    /// Local file the dataset is downloaded to
    pub path_to:              PathBuf,
    pub storage_backend:      StorageBackend,
    /// Root of the local object store
    pub storage_dir:          PathBuf,
    pub reports_dir:          PathBuf,
    /// Local copy of the trained model
    pub model_dir:            PathBuf,
    pub experiment_name:      String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            tracking_server_host: DEFAULT_TRACKING_HOST.to_string(),
            tracking_backend:     TrackingBackend::default(),
            tracking_dir:         PathBuf::from("mlruns"),
            aws_key:              "test_key".to_string(),
            aws_secret:           "test_secret".to_string(),
            aws_region:           "us-east-1".to_string(),
            s3_endpoint:          None,
            bucket:               "test_bucket".to_string(),
            path_from:            "test_path_from".to_string(),
            path_to:              PathBuf::from("test_path_to"),
            storage_backend:      StorageBackend::default(),
            storage_dir:          PathBuf::from("storage"),
            reports_dir:          PathBuf::from("reports"),
            model_dir:            PathBuf::from("models"),
            experiment_name:      DEFAULT_EXPERIMENT_NAME.to_string(),
        }
    }
}

// Credentials stay out of logs
impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("tracking_server_host", &self.tracking_server_host)
            .field("tracking_backend", &self.tracking_backend)
            .field("tracking_dir", &self.tracking_dir)
            .field("aws_key", &"***")
            .field("aws_secret", &"***")
            .field("aws_region", &self.aws_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("bucket", &self.bucket)
            .field("path_from", &self.path_from)
            .field("path_to", &self.path_to)
            .field("storage_backend", &self.storage_backend)
            .field("storage_dir", &self.storage_dir)
            .field("reports_dir", &self.reports_dir)
            .field("model_dir", &self.model_dir)
            .field("experiment_name", &self.experiment_name)
            .finish()
    }
}

impl ConnectionSettings {
    /// Overwrite every key `lookup` knows about.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("TRACKING_SERVER_HOST") { self.tracking_server_host = v; }
        if let Some(v) = lookup("TRACKING_BACKEND")     { self.tracking_backend = parse_backend("TRACKING_BACKEND", &v)?; }
        if let Some(v) = lookup("TRACKING_DIR")         { self.tracking_dir = PathBuf::from(v); }
        if let Some(v) = lookup("AWS_KEY")              { self.aws_key = v; }
        if let Some(v) = lookup("AWS_SECRET")           { self.aws_secret = v; }
        if let Some(v) = lookup("AWS_REGION")           { self.aws_region = v; }
        if let Some(v) = lookup("S3_ENDPOINT")          { self.s3_endpoint = Some(v).filter(|s| !s.is_empty()); }
        if let Some(v) = lookup("BUCKET")               { self.bucket = v; }
        if let Some(v) = lookup("PATH_FROM")            { self.path_from = v; }
        if let Some(v) = lookup("PATH_TO")              { self.path_to = PathBuf::from(v); }
        if let Some(v) = lookup("STORAGE_BACKEND")      { self.storage_backend = parse_backend("STORAGE_BACKEND", &v)?; }
        if let Some(v) = lookup("STORAGE_DIR")          { self.storage_dir = PathBuf::from(v); }
        if let Some(v) = lookup("REPORTS_DIR")          { self.reports_dir = PathBuf::from(v); }
        if let Some(v) = lookup("MODEL_DIR")            { self.model_dir = PathBuf::from(v); }
        if let Some(v) = lookup("EXPERIMENT_NAME")      { self.experiment_name = v; }
        Ok(())
    }
}

// ─── Model Parameters ─────────────────────────────────────────────────────────

/// What to learn and how to search for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    pub target_column:       String,
    /// Target value meaning "not laundering"
    pub condition_value:     Value,
    pub output_column:       String,
    pub numeric_columns:     Vec<String>,
    pub categorical_columns: Vec<String>,
    pub test_size:           f64,
    /// Seeds the train/test shuffle; random when unset
    pub random_state:        Option<u64>,
    pub cv_folds:            usize,
    pub hyperparameters:     HyperparameterGrid,
    pub tags:                BTreeMap<String, String>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            target_column:       "transaction_status".to_string(),
            condition_value:     Value::String("legitimate".to_string()),
            output_column:       "is_laundering".to_string(),
            numeric_columns:     strings(&["amount_paid", "amount_received"]),
            categorical_columns: strings(&["payment_format", "payment_currency", "receiving_currency"]),
            test_size:           0.2,
            random_state:        None,
            cv_folds:            DEFAULT_CV_FOLDS,
            hyperparameters:     HyperparameterGrid::default(),
            tags: BTreeMap::from([
                ("owner_team".to_string(), "credits".to_string()),
                ("deployer".to_string(), "ml-platform".to_string()),
                ("responsible".to_string(), "aml-team".to_string()),
                ("execution_type".to_string(), "live-scoring-model".to_string()),
                ("features".to_string(), "path/to/features".to_string()),
            ]),
        }
    }
}

impl ModelParameters {
    pub fn feature_spec(&self) -> FeatureSpec {
        FeatureSpec {
            numeric_columns:     self.numeric_columns.clone(),
            categorical_columns: self.categorical_columns.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            bail!("test_size must lie strictly between 0 and 1, got {}", self.test_size);
        }
        if self.numeric_columns.is_empty() && self.categorical_columns.is_empty() {
            bail!("At least one numeric or categorical feature column is required");
        }
        if self.cv_folds < 2 {
            bail!("cv_folds must be at least 2, got {}", self.cv_folds);
        }
        if self.output_column == self.target_column {
            bail!("output_column must differ from target_column '{}'", self.target_column);
        }
        Ok(())
    }

    /// Parameters echoed to the tracking run.
    pub fn as_run_params(&self) -> Result<BTreeMap<String, String>> {
        let condition = match &self.condition_value {
            Value::String(s) => s.clone(),
            other            => other.to_string(),
        };
        Ok(BTreeMap::from([
            ("target_column".to_string(), self.target_column.clone()),
            ("condition_value".to_string(), condition),
            ("numeric_columns".to_string(), self.numeric_columns.join(",")),
            ("categorical_columns".to_string(), self.categorical_columns.join(",")),
            ("hyperparameters".to_string(), serde_json::to_string(&self.hyperparameters)?),
            ("test_size".to_string(), self.test_size.to_string()),
        ]))
    }
}

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub model:      ModelParameters,
}

/// Tracking server URI and experiment, handed to every component
/// that talks to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingConfig {
    pub tracking_uri:    String,
    pub experiment_name: String,
}

impl TrackingConfig {
    pub fn from_connection(connection: &ConnectionSettings) -> Self {
        Self {
            tracking_uri:    format!("http://{}:{}", connection.tracking_server_host, TRACKING_PORT),
            experiment_name: connection.experiment_name.clone(),
        }
    }
}

impl Settings {
    /// Resolve settings from the optional TOML file, the optional
    /// `.env` file (default `.env`, skipped when missing) and the
    /// process environment.
    pub fn load(settings_path: Option<&Path>, env_file: Option<&Path>) -> Result<Self> {
        let mut settings = match settings_path {
            Some(path) => Self::from_toml_file(path)?,
            None       => Self::default(),
        };

        let dotenv = match env_file {
            Some(path) => read_env_file(path)?,
            None if Path::new(DEFAULT_ENV_FILE).exists() => read_env_file(Path::new(DEFAULT_ENV_FILE))?,
            None => HashMap::new(),
        };

        settings
            .connection
            .apply_overrides(|key| env::var(key).ok().or_else(|| dotenv.get(key).cloned()))?;
        settings.model.validate()?;

        tracing::debug!("Resolved settings: {:?}", settings);
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read settings file '{}'", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid settings file '{}'", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn tracking_config(&self) -> TrackingConfig {
        TrackingConfig::from_connection(&self.connection)
    }
}

/// Parse a `.env` file into a map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("Cannot read env file '{}'", path.display()))?;
    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.with_context(|| format!("Malformed line in '{}'", path.display()))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.tracking_config().tracking_uri, "http://test_tracking_server:5000");
        assert_eq!(settings.tracking_config().experiment_name, "laundering-money-model");
        assert_eq!(settings.model.output_column, "is_laundering");
        assert_eq!(settings.model.tags.len(), 5);
        assert!(settings.model.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_only_given_keys() {
        let settings = Settings::from_toml_str(
            r#"
            [connection]
            tracking_backend = "local"

            [model]
            condition_value = 0
            test_size = 0.3

            [model.hyperparameters]
            max_depth = [2]
            subsample = [0.8]
            "#,
        )
        .unwrap();
        assert_eq!(settings.connection.tracking_backend, TrackingBackend::Local);
        assert_eq!(settings.connection.bucket, "test_bucket");
        assert_eq!(settings.model.condition_value, json!(0));
        assert_eq!(settings.model.test_size, 0.3);
        assert_eq!(settings.model.hyperparameters.max_depth, vec![2]);
        assert_eq!(settings.model.hyperparameters.n_estimators, vec![50, 100]);
        assert_eq!(settings.model.hyperparameters.subsample, vec![0.8]);
        assert_eq!(settings.model.hyperparameters.colsample_bytree, vec![1.0]);
        assert_eq!(settings.model.target_column, "transaction_status");
    }

    #[test]
    fn test_env_lookup_overrides_connection() {
        let mut conn = ConnectionSettings::default();
        let vars = HashMap::from([
            ("TRACKING_SERVER_HOST", "ec2-1-2-3-4"),
            ("STORAGE_BACKEND", "LOCAL"),
            ("S3_ENDPOINT", ""),
        ]);
        conn.apply_overrides(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(conn.tracking_server_host, "ec2-1-2-3-4");
        assert_eq!(conn.storage_backend, StorageBackend::Local);
        assert_eq!(conn.s3_endpoint, None);
        assert_eq!(TrackingConfig::from_connection(&conn).tracking_uri, "http://ec2-1-2-3-4:5000");
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let mut conn = ConnectionSettings::default();
        let err = conn.apply_overrides(|k| (k == "TRACKING_BACKEND").then(|| "sqlite".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn test_env_file_is_read_without_touching_process_env() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.env");
        fs::write(&path, "BUCKET=laundering-data\n# comment\nPATH_FROM=raw/tx.json\n").unwrap();

        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get("BUCKET").map(String::as_str), Some("laundering-data"));
        assert_eq!(vars.get("PATH_FROM").map(String::as_str), Some("raw/tx.json"));
        assert!(env::var("PATH_FROM").is_err());
    }

    #[test]
    fn test_invalid_test_size_is_rejected() {
        let params = ModelParameters { test_size: 1.0, ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_run_params_echo_model_parameters() {
        let params = ModelParameters::default().as_run_params().unwrap();
        assert_eq!(params["condition_value"], "legitimate");
        assert_eq!(params["numeric_columns"], "amount_paid,amount_received");
        assert_eq!(params["test_size"], "0.2");
        assert!(params["hyperparameters"].contains("n_estimators"));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let conn = ConnectionSettings { aws_secret: "hunter2".to_string(), ..Default::default() };
        assert!(!format!("{conn:?}").contains("hunter2"));
    }
}
