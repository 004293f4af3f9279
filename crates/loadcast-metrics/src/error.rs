//! Error types for metric queries.

use thiserror::Error;

/// Result type alias for metrics source operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors from the metrics backend.
///
/// Callers treat all variants identically (fall back to synthetic or
/// default data); the split exists for log fidelity.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("query timed out after {0}s")]
    Timeout(u64),

    #[error("bad response from metrics backend: {0}")]
    BadResponse(String),
}
