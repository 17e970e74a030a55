// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums, and traits that define the core
// concepts of the system: transaction records, registered
// model versions, and the seams to the outside world.
//
// Rules for this layer:
//   - NO network or file I/O
//   - NO ML math
//   - Only plain data types and traits
//
// The traits here are implemented by Layer 6 (infra):
//   ObjectStore        → S3ObjectStore, LocalObjectStore
//   ExperimentTracker  → MlflowClient, LocalTracker
//   ModelRegistry      → MlflowClient, LocalTracker
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Tabular transaction records and the Dataset container
pub mod record;

// Registered model versions, stages, and tracking runs
pub mod model_version;

// Typed errors the application layer branches on
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
