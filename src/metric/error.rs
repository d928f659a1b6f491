//! Metric-store error types.

use thiserror::Error;

/// Errors that can occur while persisting or querying metrics.
#[derive(Debug, Error)]
pub enum MetricError {
    /// File I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
