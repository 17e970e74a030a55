// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Most of the crate propagates anyhow::Error with context.
// The errors below are the ones a caller may want to match on,
// so they get a concrete type that can be recovered with
// anyhow::Error::downcast_ref.

use thiserror::Error;

/// Problems with the shape or content of a dataset.
#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    /// A partition (or the whole download) holds no rows.
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// One or more partitions failed validation.
    /// Carries every failure, not just the first one.
    #[error("The generated dataset is not valid: {}", .0.join("; "))]
    InvalidPartitions(Vec<String>),

    /// A configured column is absent from every row.
    #[error("Column '{0}' not found in dataset")]
    MissingColumn(String),

    /// Column-oriented input whose columns disagree on length.
    #[error("Column '{column}' has {found} values, expected {expected}")]
    ColumnLengthMismatch {
        column:   String,
        expected: usize,
        found:    usize,
    },

    /// A label cell that is not 0 or 1.
    #[error("Label column '{column}' holds a non-binary value at row {row}")]
    InvalidLabel { column: String, row: usize },

    /// The thread validating a partition panicked.
    #[error("{partition} panicked: {message}")]
    ValidationPanicked { partition: String, message: String },
}

/// Failures talking to the tracking server.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The server answered with a non-2xx status.
    #[error("{endpoint} failed with HTTP {status} ({code}): {message}")]
    Api {
        endpoint: String,
        status:   u16,
        /// MLflow error code, e.g. RESOURCE_ALREADY_EXISTS
        code:     String,
        message:  String,
    },

    /// The request never got an answer.
    #[error("{endpoint} unreachable: {message}")]
    Transport { endpoint: String, message: String },

    /// The answer did not have the expected shape.
    #[error("Unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl TrackingError {
    pub fn code(&self) -> Option<&str> {
        match self {
            TrackingError::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.code() == Some("RESOURCE_ALREADY_EXISTS")
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackingError::Api { status: 404, .. })
            || self.code() == Some("RESOURCE_DOES_NOT_EXIST")
    }
}
