//! Error types for surge-services.

use thiserror::Error;

/// Result type alias using SurgeError.
pub type SurgeResult<T> = Result<T, SurgeError>;

/// Primary error type for the aggregation pipeline.
///
/// Only `RepositoryUnavailable` and `InvalidFilter` abort a request;
/// every other variant is captured per source or per slice and folded
/// into a degraded response.
#[derive(Debug, Error)]
pub enum SurgeError {
    // === Caller errors ===
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    // === Catalog errors ===
    #[error("Catalog unavailable: {0}")]
    RepositoryUnavailable(String),

    // === Resolution errors ===
    #[error("No resolvable source: {0}")]
    NoResolvableSource(String),

    // === Per-source errors ===
    #[error("Source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Unparseable remote payload: {0}")]
    FormatError(String),

    // === Per-slice errors ===
    #[error("Normalization failed: {0}")]
    NormalizationError(String),

    // === Infrastructure errors ===
    #[error("Request deadline elapsed")]
    Timeout,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl SurgeError {
    /// Whether this error aborts the whole request rather than degrading it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SurgeError::InvalidFilter(_) | SurgeError::RepositoryUnavailable(_)
        )
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            SurgeError::InvalidFilter(_) => 400,
            SurgeError::VariableNotFound(_) => 404,
            SurgeError::RepositoryUnavailable(_) => 503,
            SurgeError::Timeout => 504,
            _ => 500,
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for SurgeError {
    fn from(err: std::io::Error) -> Self {
        SurgeError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for SurgeError {
    fn from(err: serde_json::Error) -> Self {
        SurgeError::InternalError(format!("JSON error: {}", err))
    }
}
