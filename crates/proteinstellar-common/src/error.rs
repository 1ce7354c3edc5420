use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure categories surfaced per item in a batch report.
///
/// Every crate-level error maps onto exactly one kind through [`Classify`], so
/// reporting collaborators can group failures without knowing the concrete
/// error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedStructure,
    UnsupportedFormat,
    IncompatibleStructures,
    TransientEngine,
    TerminalEngine,
    Timeout,
    Cancelled,
    InvalidSequence,
    Config,
}

impl ErrorKind {
    /// Whether a failure of this kind may succeed on a later attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientEngine | ErrorKind::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedStructure => "malformed_structure",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::IncompatibleStructures => "incompatible_structures",
            ErrorKind::TransientEngine => "transient_engine",
            ErrorKind::TerminalEngine => "terminal_engine",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidSequence => "invalid_sequence",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a concrete error onto the shared taxonomy.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum StellarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StellarError {
    pub fn config(msg: impl Into<String>) -> Self {
        StellarError::Config(msg.into())
    }
}

impl Classify for StellarError {
    fn kind(&self) -> ErrorKind {
        match self {
            StellarError::InvalidSequence(_) => ErrorKind::InvalidSequence,
            _ => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, StellarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_engine_kinds_are_retryable() {
        assert!(ErrorKind::TransientEngine.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::TerminalEngine.is_retryable());
        assert!(!ErrorKind::MalformedStructure.is_retryable());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MalformedStructure).unwrap();
        assert_eq!(json, "\"malformed_structure\"");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_stellar_error_classification() {
        assert_eq!(StellarError::config("bad").kind(), ErrorKind::Config);
        assert_eq!(
            StellarError::InvalidSequence("empty".into()).kind(),
            ErrorKind::InvalidSequence
        );
    }
}
