use proteinstellar_common::{Classify, ErrorKind};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed {dialect} structure{line_desc}: {details}", line_desc = LineDisplay(line))]
    Malformed {
        dialect: &'static str,
        line: Option<usize>,
        details: String,
    },

    #[error("unsupported structure format: {0}")]
    UnsupportedFormat(String),
}

impl ParseError {
    pub fn malformed(dialect: &'static str, line: Option<usize>, details: impl Into<String>) -> Self {
        Self::Malformed { dialect, line, details: details.into() }
    }

    pub fn unsupported(details: impl Into<String>) -> Self {
        Self::UnsupportedFormat(details.into())
    }
}

impl Classify for ParseError {
    fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Malformed { .. } => ErrorKind::MalformedStructure,
            ParseError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
        }
    }
}

struct LineDisplay<'a>(&'a Option<usize>);

impl<'a> fmt::Display for LineDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, " (line {})", n),
            None => Ok(()),
        }
    }
}
