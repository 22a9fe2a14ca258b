//! Response and per-source status vocabulary.

use serde::{Deserialize, Serialize};

use crate::error::SurgeError;

/// Outcome of one resolved data source within a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceStatus {
    Ok,
    TimedOut,
    Unavailable,
    FormatError,
}

impl SourceStatus {
    /// Map a per-source error onto the wire vocabulary.
    pub fn from_error(err: &SurgeError) -> Self {
        match err {
            SurgeError::Timeout => SourceStatus::TimedOut,
            SurgeError::FormatError(_) | SurgeError::NormalizationError(_) => {
                SourceStatus::FormatError
            }
            _ => SourceStatus::Unavailable,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SourceStatus::Ok)
    }
}

/// Overall status of an aggregated response.
///
/// `NotReady` is the "run exists but has produced no data yet" flavor of
/// not-found; the viewer renders it differently from an unknown run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseStatus {
    Ok,
    Degraded,
    NotFound,
    NotReady,
}
