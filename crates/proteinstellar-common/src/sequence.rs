//! Protein sequence input.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StellarError};

const STANDARD_RESIDUES: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";
const AMBIGUITY_CODES: &[u8] = b"BZJX";
const NONSTANDARD_RESIDUES: &[u8] = b"UO";

/// A validated, immutable amino-acid sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sequence(Arc<str>);

impl Sequence {
    /// Validate and normalize a sequence.
    ///
    /// ASCII whitespace is dropped (so wrapped FASTA lines can be passed as-is)
    /// and symbols are upper-cased before validation.
    pub fn new(raw: &str) -> Result<Self> {
        let mut residues = String::with_capacity(raw.len());
        for (pos, ch) in raw.chars().filter(|c| !c.is_ascii_whitespace()).enumerate() {
            let up = ch.to_ascii_uppercase();
            if !up.is_ascii() || !is_valid_symbol(up as u8) {
                return Err(StellarError::InvalidSequence(format!(
                    "symbol '{}' at position {} is not an amino-acid code",
                    ch,
                    pos + 1
                )));
            }
            residues.push(up);
        }

        if residues.is_empty() {
            return Err(StellarError::InvalidSequence("sequence is empty".to_string()));
        }

        Ok(Self(residues.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the sequence only uses the 20 standard residues.
    pub fn is_unambiguous(&self) -> bool {
        self.0.bytes().all(|b| STANDARD_RESIDUES.contains(&b))
    }
}

fn is_valid_symbol(b: u8) -> bool {
    STANDARD_RESIDUES.contains(&b) || AMBIGUITY_CODES.contains(&b) || NONSTANDARD_RESIDUES.contains(&b)
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Sequence {
    type Error = StellarError;

    fn try_from(value: String) -> Result<Self> {
        Sequence::new(&value)
    }
}

impl From<Sequence> for String {
    fn from(value: Sequence) -> Self {
        value.0.to_string()
    }
}

/// A labelled, not yet validated sequence as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceInput {
    pub id: String,
    pub residues: String,
}

impl SequenceInput {
    pub fn new(id: impl Into<String>, residues: impl Into<String>) -> Self {
        Self { id: id.into(), residues: residues.into() }
    }

    /// Label plain strings as `seq_1`, `seq_2`, … in input order.
    pub fn from_strings<I, S>(sequences: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        sequences
            .into_iter()
            .enumerate()
            .map(|(i, s)| Self::new(format!("seq_{}", i + 1), s))
            .collect()
    }
}

/// Split FASTA text into labelled inputs.
///
/// The id is the first whitespace-delimited token of the header. Residue lines
/// are concatenated verbatim; validation happens later, per item, so one bad
/// record does not hide the others.
pub fn parse_fasta(text: &str) -> Result<Vec<SequenceInput>> {
    let mut records: Vec<SequenceInput> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            let id = header.split_whitespace().next().unwrap_or("");
            let id = if id.is_empty() {
                format!("seq_{}", records.len() + 1)
            } else {
                id.to_string()
            };
            records.push(SequenceInput::new(id, String::new()));
        } else {
            match records.last_mut() {
                Some(rec) => rec.residues.push_str(line),
                None => {
                    return Err(StellarError::InvalidSequence(format!(
                        "FASTA residue data before first header (line {})",
                        line_no + 1
                    )))
                }
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalizes_case_and_whitespace() {
        let seq = Sequence::new("mkt ay\niak").unwrap();
        assert_eq!(seq.as_str(), "MKTAYIAK");
        assert_eq!(seq.len(), 8);
        assert!(seq.is_unambiguous());
    }

    #[test]
    fn test_accepts_ambiguity_codes() {
        let seq = Sequence::new("MKXBZ").unwrap();
        assert!(!seq.is_unambiguous());
    }

    #[test]
    fn test_rejects_empty_and_invalid() {
        assert!(matches!(Sequence::new("  \n"), Err(StellarError::InvalidSequence(_))));
        let err = Sequence::new("MK1T").unwrap_err();
        assert!(err.to_string().contains("position 3"));
    }

    #[test]
    fn test_serde_validates() {
        let ok: Sequence = serde_json::from_str("\"acd\"").unwrap();
        assert_eq!(ok.as_str(), "ACD");
        assert!(serde_json::from_str::<Sequence>("\"AC#\"").is_err());
    }

    #[test]
    fn test_parse_fasta() {
        let text = ">sp|P01 first protein\nMKTAY\nIAKQR\n\n>second\nGGG\n";
        let records = parse_fasta(text).unwrap();
        assert_eq!(
            records,
            vec![
                SequenceInput::new("sp|P01", "MKTAYIAKQR"),
                SequenceInput::new("second", "GGG"),
            ]
        );
    }

    #[test]
    fn test_parse_fasta_rejects_headerless_data() {
        assert!(parse_fasta("MKT\n>x\nAAA").is_err());
    }

    #[test]
    fn test_from_strings_labels_in_order() {
        let inputs = SequenceInput::from_strings(["AAA", "CCC"]);
        assert_eq!(inputs[0].id, "seq_1");
        assert_eq!(inputs[1].residues, "CCC");
    }
}
