use proteinstellar_common::{Classify, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why an engine refused a job for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    InvalidSequence,
    QuotaExhausted,
    Rejected,
    Other,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalReason::InvalidSequence => "invalid sequence",
            TerminalReason::QuotaExhausted => "quota exhausted",
            TerminalReason::Rejected => "rejected",
            TerminalReason::Other => "failed",
        };
        f.write_str(s)
    }
}

/// Errors crossing the folding-engine boundary.
///
/// Clonable so a single job outcome can be shared by every caller that joined
/// the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EngineError {
    /// Network trouble, overload, rate limiting. Worth another attempt.
    #[error("Transient engine error: {0}")]
    Transient(String),

    #[error("Engine {reason}: {message}")]
    Terminal { reason: TerminalReason, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Job cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn transient(msg: impl Into<String>) -> Self {
        EngineError::Transient(msg.into())
    }

    pub fn terminal(reason: TerminalReason, msg: impl Into<String>) -> Self {
        EngineError::Terminal { reason, message: msg.into() }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        EngineError::Timeout(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl Classify for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Transient(_) => ErrorKind::TransientEngine,
            EngineError::Terminal { .. } => ErrorKind::TerminalEngine,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout(err.to_string())
        } else if err.is_decode() {
            EngineError::terminal(TerminalReason::Other, format!("unreadable engine response: {}", err))
        } else {
            EngineError::Transient(err.to_string())
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::terminal(TerminalReason::Other, format!("I/O error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(EngineError::transient("reset").kind(), ErrorKind::TransientEngine);
        assert_eq!(EngineError::timeout("60s").kind(), ErrorKind::Timeout);
        assert_eq!(
            EngineError::terminal(TerminalReason::QuotaExhausted, "no credits").kind(),
            ErrorKind::TerminalEngine
        );
        assert_eq!(EngineError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_retryability() {
        assert!(EngineError::transient("503").is_retryable());
        assert!(EngineError::timeout("poll").is_retryable());
        assert!(!EngineError::terminal(TerminalReason::InvalidSequence, "bad").is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
    }

    #[test]
    fn test_display_names_reason() {
        let err = EngineError::terminal(TerminalReason::InvalidSequence, "residue 4 is '*'");
        assert_eq!(err.to_string(), "Engine invalid sequence: residue 4 is '*'");
    }
}
