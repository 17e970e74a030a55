// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the outside world:
//
//   config.rs        — Settings resolution
//                      defaults → TOML → .env → environment,
//                      plus the explicit TrackingConfig
//
//   http.rs          — Shared ureq agent and URI encoding
//
//   object_store.rs  — Raw data download
//                      S3 (SigV4-signed GET) or a local
//                      directory laid out like a bucket
//
//   mlflow.rs        — ExperimentTracker + ModelRegistry over
//                      the MLflow REST API
//
//   local_tracker.rs — The same two traits backed by files,
//                      for offline runs and tests
//
//   checkpoint.rs    — Saving and loading the fitted model
//
//   metrics.rs       — Grid search results as CSV
//
//   reports.rs       — Report publisher, drift and quality
//                      report
//
// Why is this a separate layer?
//   The application layer only sees the traits from Layer 3,
//   so swapping MLflow for the local tracker (or S3 for a
//   directory) is a configuration change, not a code change.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Settings and tracking configuration
pub mod config;

/// Shared HTTP agent
pub mod http;

/// S3 and local object stores
pub mod object_store;

/// MLflow REST client
pub mod mlflow;

/// File-backed tracker and registry
pub mod local_tracker;

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Grid search results CSV
pub mod metrics;

/// Markdown/JSON report artifacts
pub mod reports;
