use proteinstellar_common::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("Incompatible structures: model has {model} residues, reference has {reference}, and no residue mapping was given")]
    LengthMismatch { model: usize, reference: usize },

    #[error("Incompatible structures: invalid residue mapping: {0}")]
    InvalidMapping(String),
}

impl Classify for MetricsError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::IncompatibleStructures
    }
}
