//! Error taxonomy for the cleaning workflow.
//!
//! Every orchestrator operation returns `Result<T, SweepError>` and the
//! presentation layer decides how each kind is rendered.

use std::fmt;
use thiserror::Error;

/// A failed request round trip to the cleaning engine.
///
/// `status` is present for non-2xx responses; `detail` carries the
/// server-provided `detail` string when the engine sent one.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub status: Option<u16>,
    pub detail: Option<String>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.detail, self.status) {
            (Some(detail), Some(status)) => write!(f, "{detail} (status {status})"),
            (Some(detail), None) => write!(f, "{detail}"),
            (None, Some(status)) => write!(f, "cleaning engine returned status {status}"),
            (None, None) => write!(f, "could not reach the cleaning engine"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError {
            status: err.status().map(|s| s.as_u16()),
            detail: Some(err.to_string()),
        }
    }
}

/// Main error type for workflow operations.
#[derive(Debug, Error)]
pub enum SweepError {
    /// File rejected by the intake predicate before any network call.
    #[error("unsupported file: {0} (expected csv, xlsx, or xls)")]
    Validation(String),

    /// Non-2xx response, timeout, or malformed body from the engine.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A pipeline call was issued out of order. Caller bug, not user-facing.
    #[error("pipeline step out of order: {0}")]
    Sequence(&'static str),

    /// The engine answered an export request with a zero-byte body.
    #[error("export returned an empty file")]
    EmptyArtifact,

    /// Local filesystem failure while reading the upload or saving an artifact.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SweepError {
    /// Whether the error came from the transport boundary.
    pub fn is_transport(&self) -> bool {
        matches!(self, SweepError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display_prefers_server_detail() {
        let e = TransportError {
            status: Some(400),
            detail: Some("File must be CSV or Excel".into()),
        };
        assert_eq!(e.to_string(), "File must be CSV or Excel (status 400)");
    }

    #[test]
    fn transport_display_falls_back_to_generic_message() {
        let e = TransportError {
            status: Some(502),
            detail: None,
        };
        assert_eq!(e.to_string(), "cleaning engine returned status 502");

        let e = TransportError {
            status: None,
            detail: None,
        };
        assert_eq!(e.to_string(), "could not reach the cleaning engine");
    }

    #[test]
    fn empty_artifact_is_distinct_from_transport() {
        let e = SweepError::EmptyArtifact;
        assert!(!e.is_transport());
        assert_eq!(e.to_string(), "export returned an empty file");
    }
}
