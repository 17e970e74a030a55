// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the downloaded file and the two
// partitions the model builder consumes.
//
// The pipeline flows in this order:
//
//   downloaded .json dump
//       │
//       ▼
//   loader            → deserializes into a Dataset
//       │
//       ▼
//   labeler           → derives the binary output column
//       │
//       ▼
//   splitter          → shuffles and splits train / test
//       │
//       ▼
//   validator         → both partitions must be non-empty
//
// Each module is responsible for exactly one step.

/// Deserializes column- or record-oriented JSON dumps
pub mod loader;

/// Derives the 0/1 output column
pub mod labeler;

/// Shuffles and splits data into train/test sets
pub mod splitter;

/// Non-emptiness checks, run in parallel per partition
pub mod validator;
