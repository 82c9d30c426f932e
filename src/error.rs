use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decoding failure for a response body that is neither an event stream nor JSON.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("hard parse error: {0}")]
    HardParse(#[from] serde_json::Error),
}

/// Failure raised by an [`HttpTransport`](crate::driver::traits::HttpTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Why a workflow step did not succeed.
///
/// None of these are fatal to the run; they are counted and logged and the
/// workflow moves on to the next step it can execute.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("{step}: could not parse response body: {source}")]
    HardParse {
        step: String,
        #[source]
        source: DecodeError,
    },

    #[error("{step}: HTTP {status}, expected one of {expected:?}")]
    HttpStatus {
        step: String,
        status: u16,
        expected: Vec<u16>,
    },

    #[error("{step}: validation failed: {detail}")]
    Validation { step: String, detail: String },

    #[error("{step}: skipped, {missing} not available")]
    DependencyUnavailable { step: String, missing: &'static str },

    #[error("{step}: {source}")]
    Transport {
        step: String,
        #[source]
        source: TransportError,
    },
}

impl StepFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepFailure::HardParse { .. } => FailureKind::HardParse,
            StepFailure::HttpStatus { .. } => FailureKind::HttpStatus,
            StepFailure::Validation { .. } => FailureKind::Validation,
            StepFailure::DependencyUnavailable { .. } => FailureKind::DependencyUnavailable,
            StepFailure::Transport { .. } => FailureKind::Transport,
        }
    }
}

/// Serializable classification of a [`StepFailure`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    HardParse,
    HttpStatus,
    Validation,
    DependencyUnavailable,
    Transport,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::HardParse => "hard_parse",
            FailureKind::HttpStatus => "http_status",
            FailureKind::Validation => "validation",
            FailureKind::DependencyUnavailable => "dependency_unavailable",
            FailureKind::Transport => "transport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_kind() {
        let failure = StepFailure::Transport {
            step: "login".to_string(),
            source: TransportError::Timeout {
                url: "http://test.local/login".to_string(),
            },
        };
        assert_eq!(failure.kind(), FailureKind::Transport);
        assert_eq!(failure.kind().as_str(), "transport");
        assert!(failure.to_string().contains("timed out"));
    }
}
