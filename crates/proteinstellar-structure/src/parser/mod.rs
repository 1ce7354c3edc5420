//! Structure file parsing.
//!
//! [`StructureParser`] detects the dialect of a raw text and delegates
//! tokenizing to a [`StructureDialect`]. New dialects plug in through
//! [`StructureParser::with_dialect`] without touching the record model or
//! anything downstream of it.
//!
//! Parsing is a pure function of the input text: the same text always yields
//! an identical [`StructureRecord`].

mod builder;
mod error;
mod mmcif;
mod pdb;

pub use builder::{AtomSite, DialectOutput};
pub use error::ParseError;
pub use mmcif::MmcifDialect;
pub use pdb::PdbDialect;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::StructureRecord;

/// How B-factor column values map onto the normalized [0, 1] confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceScale {
    /// 0-100 if any value exceeds 1.0, otherwise already a fraction
    #[default]
    Auto,
    Fraction,
    Percent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserOptions {
    pub confidence_scale: ConfidenceScale,
}

/// A macromolecular text format.
pub trait StructureDialect: Send + Sync {
    /// Short identifier recorded in [`SourceMetadata::dialect`](crate::model::SourceMetadata).
    fn name(&self) -> &'static str;

    /// Cheap check whether `text` looks like this dialect.
    fn detect(&self, text: &str) -> bool;

    /// Tokenize the first model into atom sites.
    fn read(&self, text: &str) -> Result<DialectOutput, ParseError>;
}

pub struct StructureParser {
    dialects: Vec<Box<dyn StructureDialect>>,
    options: ParserOptions,
}

impl std::fmt::Debug for StructureParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructureParser")
            .field("dialects", &self.dialects.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for StructureParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureParser {
    /// Parser for mmCIF and PDB, tried in that order.
    pub fn new() -> Self {
        Self {
            dialects: vec![Box::new(MmcifDialect), Box::new(PdbDialect)],
            options: ParserOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    /// Register an extra dialect. It is tried before the built-in ones.
    pub fn with_dialect(mut self, dialect: Box<dyn StructureDialect>) -> Self {
        self.dialects.insert(0, dialect);
        self
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn parse(&self, raw: &str) -> Result<StructureRecord, ParseError> {
        if raw.contains('\0') {
            return Err(ParseError::unsupported("binary payload is not a text structure format"));
        }

        let dialect = self
            .dialects
            .iter()
            .find(|d| d.detect(raw))
            .ok_or_else(|| ParseError::unsupported(describe_unknown(raw)))?;

        debug!(dialect = dialect.name(), bytes = raw.len(), "Parsing structure");
        let output = dialect.read(raw)?;
        builder::assemble(dialect.name(), output, &self.options, raw)
    }

    /// Parse raw bytes; non-UTF-8 input (e.g. BinaryCIF) is unsupported.
    pub fn parse_bytes(&self, raw: &[u8]) -> Result<StructureRecord, ParseError> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| ParseError::unsupported("payload is not UTF-8 text (binary format?)"))?;
        self.parse(text)
    }
}

/// Parse with the default dialects and options.
pub fn parse(raw: &str) -> Result<StructureRecord, ParseError> {
    StructureParser::new().parse(raw)
}

fn describe_unknown(raw: &str) -> String {
    let first = raw.lines().map(str::trim).find(|l| !l.is_empty());
    match first {
        None => "empty input".to_string(),
        Some(line) if line.starts_with("@<TRIPOS>") => "Tripos MOL2 is not a supported structure format".to_string(),
        Some(line) if line.starts_with('{') || line.starts_with('[') => {
            "JSON payload is not a supported structure format".to_string()
        }
        Some(line) => {
            let preview: String = line.chars().take(40).collect();
            format!("no recognized records (first line: {:?})", preview)
        }
    }
}
