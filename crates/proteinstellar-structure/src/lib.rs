//! Proteinstellar Structure - predicted structure model and file parsing.
//!
//! 1. [`model`]: the immutable [`StructureRecord`] (chains, residues, atoms,
//!    per-residue confidence, provenance)
//! 2. [`parser`]: dialect detection and parsing of PDB and mmCIF text

pub mod model;
pub mod parser;

pub use model::{
    distance_squared, three_to_one, Atom, Chain, ParseWarning, Residue, ResidueId, SourceMetadata,
    StructureRecord, WarningKind,
};
pub use parser::{
    parse, ConfidenceScale, MmcifDialect, ParseError, ParserOptions, PdbDialect, StructureDialect,
    StructureParser,
};
