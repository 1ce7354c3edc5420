//! In-memory representation of a parsed, predicted structure.
//!
//! A [`StructureRecord`] is immutable once built: fields are private and only
//! exposed through borrowing accessors. Atoms refer back to their residue by
//! [`ResidueId`] (an index pair) rather than by pointer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::ParseError;

/// Position of a residue inside a record: chain index, then residue index
/// within that chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResidueId {
    pub chain: usize,
    pub residue: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Serial number as written in the file, if any
    pub serial: Option<i64>,
    /// Atom name (e.g. "CA", "N", "OG1")
    pub name: String,
    pub element: String,
    /// Cartesian position in Å
    pub coord: [f64; 3],
    pub occupancy: f64,
    /// Per-atom confidence on the normalized [0, 1] scale
    pub confidence: Option<f64>,
    /// Owning residue
    pub residue: ResidueId,
}

impl Atom {
    pub fn distance_squared(&self, other: &Atom) -> f64 {
        distance_squared(&self.coord, &other.coord)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Residue {
    /// Three-letter residue name
    pub name: String,
    /// Residue number from the file
    pub seq_num: i32,
    pub insertion_code: Option<char>,
    /// HETATM residue
    pub hetero: bool,
    /// Atoms in file order
    pub atoms: Vec<Atom>,
}

impl Residue {
    pub fn new(name: impl Into<String>, seq_num: i32) -> Self {
        Self {
            name: name.into(),
            seq_num,
            insertion_code: None,
            hetero: false,
            atoms: Vec::new(),
        }
    }

    /// Ordering key inside a chain.
    pub fn key(&self) -> (i32, Option<char>) {
        (self.seq_num, self.insertion_code)
    }

    pub fn atom(&self, name: &str) -> Option<&Atom> {
        self.atoms.iter().find(|a| a.name == name)
    }

    /// The atom used for residue-level geometry: CA when present, otherwise
    /// the first atom in file order.
    pub fn representative_atom(&self) -> Option<&Atom> {
        self.atom("CA").or_else(|| self.atoms.first())
    }

    /// Mean of per-atom confidences, `None` when no atom carries one.
    pub fn confidence(&self) -> Option<f64> {
        let (sum, n) = self
            .atoms
            .iter()
            .filter_map(|a| a.confidence)
            .fold((0.0, 0usize), |(s, n), c| (s + c, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    pub fn one_letter_code(&self) -> char {
        three_to_one(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: String,
    pub residues: Vec<Residue>,
}

impl Chain {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), residues: Vec::new() }
    }

    pub fn atom_count(&self) -> usize {
        self.residues.iter().map(|r| r.atoms.len()).sum()
    }

    /// One-letter sequence of the chain's residues.
    pub fn sequence(&self) -> String {
        self.residues.iter().map(Residue::one_letter_code).collect()
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Dialect that parsed the text ("pdb", "mmcif", ...)
    pub dialect: String,
    /// SHA-256 of the raw text
    pub checksum: String,
    /// Folding engine that produced the file
    pub engine: Option<String>,
    /// When the engine reported completion
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of models in the file; only the first is kept
    pub model_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ConfidenceClamped,
    AltLocSkipped,
    ExtraModelsIgnored,
}

/// Non-fatal irregularity noticed while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl ParseWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    chains: Vec<Chain>,
    /// Per-residue confidence aligned with the flattened residue order
    confidence: Vec<Option<f64>>,
    source: SourceMetadata,
    warnings: Vec<ParseWarning>,
}

impl StructureRecord {
    /// Build a record from chains, checking the model invariants:
    /// every residue has at least one atom, and residue keys strictly increase
    /// within each chain. Atom back-references are rewritten to match.
    pub fn from_chains(chains: Vec<Chain>, source: SourceMetadata) -> Result<Self, ParseError> {
        Self::assemble(chains, source, Vec::new())
    }

    pub(crate) fn assemble(
        mut chains: Vec<Chain>,
        source: SourceMetadata,
        warnings: Vec<ParseWarning>,
    ) -> Result<Self, ParseError> {
        for (ci, chain) in chains.iter_mut().enumerate() {
            let mut prev: Option<(i32, Option<char>)> = None;
            for (ri, residue) in chain.residues.iter_mut().enumerate() {
                if residue.atoms.is_empty() {
                    return Err(ParseError::malformed(
                        "model",
                        None,
                        format!("residue {} {} in chain {} has no atoms", residue.name, residue.seq_num, chain.id),
                    ));
                }
                if let Some(p) = prev {
                    if residue.key() <= p {
                        return Err(ParseError::malformed(
                            "model",
                            None,
                            format!(
                                "residue numbering in chain {} is not strictly increasing at {}",
                                chain.id, residue.seq_num
                            ),
                        ));
                    }
                }
                prev = Some(residue.key());
                for atom in &mut residue.atoms {
                    atom.residue = ResidueId { chain: ci, residue: ri };
                }
            }
        }

        let confidence = chains
            .iter()
            .flat_map(|c| c.residues.iter())
            .map(Residue::confidence)
            .collect();

        Ok(Self { chains, confidence, source, warnings })
    }

    /// A record with no chains. Metrics over it are all undefined.
    pub fn empty(source: SourceMetadata) -> Self {
        Self { chains: Vec::new(), confidence: Vec::new(), source, warnings: Vec::new() }
    }

    /// A CA-only single-chain record, convenient for geometry from other
    /// sources. `confidence`, when given, must match `coords` in length.
    pub fn from_ca_trace(
        chain_id: &str,
        coords: &[[f64; 3]],
        confidence: Option<&[f64]>,
    ) -> Result<Self, ParseError> {
        if let Some(conf) = confidence {
            if conf.len() != coords.len() {
                return Err(ParseError::malformed(
                    "model",
                    None,
                    format!("{} confidences for {} residues", conf.len(), coords.len()),
                ));
            }
        }
        let mut chain = Chain::new(chain_id);
        for (i, coord) in coords.iter().enumerate() {
            let mut residue = Residue::new("GLY", i as i32 + 1);
            residue.atoms.push(Atom {
                serial: Some(i as i64 + 1),
                name: "CA".to_string(),
                element: "C".to_string(),
                coord: *coord,
                occupancy: 1.0,
                confidence: confidence.map(|c| c[i]),
                residue: ResidueId::default(),
            });
            chain.residues.push(residue);
        }
        Self::from_chains(vec![chain], SourceMetadata::default())
    }

    /// Attach engine provenance. Consumes the record so the result is still
    /// a single, immutable value.
    pub fn with_provenance(mut self, engine: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        self.source.engine = Some(engine.into());
        self.source.completed_at = Some(completed_at);
        self
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain(&self, id: &str) -> Option<&Chain> {
        self.chains.iter().find(|c| c.id == id)
    }

    pub fn source(&self) -> &SourceMetadata {
        &self.source
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Per-residue confidence, aligned with [`residues`](Self::residues).
    pub fn confidence(&self) -> &[Option<f64>] {
        &self.confidence
    }

    /// Residues in flattened order (chains in order, residues in order).
    pub fn residues(&self) -> impl Iterator<Item = &Residue> + '_ {
        self.chains.iter().flat_map(|c| c.residues.iter())
    }

    pub fn residue(&self, id: ResidueId) -> Option<&Residue> {
        self.chains.get(id.chain)?.residues.get(id.residue)
    }

    pub fn residue_count(&self) -> usize {
        self.confidence.len()
    }

    pub fn atom_count(&self) -> usize {
        self.chains.iter().map(Chain::atom_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.confidence.is_empty()
    }

    /// Representative coordinates in flattened residue order.
    pub fn representative_coords(&self) -> Vec<[f64; 3]> {
        self.residues()
            .filter_map(|r| r.representative_atom().map(|a| a.coord))
            .collect()
    }

    /// Chain index of each residue in flattened order.
    pub fn residue_chain_indices(&self) -> Vec<usize> {
        self.chains
            .iter()
            .enumerate()
            .flat_map(|(ci, c)| std::iter::repeat(ci).take(c.residues.len()))
            .collect()
    }

    /// One-letter sequence across all chains, polymer residues only.
    pub fn sequence(&self) -> String {
        self.residues().filter(|r| !r.hetero).map(Residue::one_letter_code).collect()
    }
}

pub fn distance_squared(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Map a three-letter residue name to its one-letter code; unknown names map to 'X'.
pub fn three_to_one(name: &str) -> char {
    match name.to_ascii_uppercase().as_str() {
        "ALA" => 'A',
        "ARG" => 'R',
        "ASN" => 'N',
        "ASP" => 'D',
        "CYS" => 'C',
        "GLN" => 'Q',
        "GLU" => 'E',
        "GLY" => 'G',
        "HIS" | "HID" | "HIE" | "HIP" => 'H',
        "ILE" => 'I',
        "LEU" => 'L',
        "LYS" => 'K',
        "MET" | "MSE" => 'M',
        "PHE" => 'F',
        "PRO" => 'P',
        "SER" => 'S',
        "THR" => 'T',
        "TRP" => 'W',
        "TYR" => 'Y',
        "VAL" => 'V',
        "SEC" => 'U',
        "PYL" => 'O',
        "ASX" => 'B',
        "GLX" => 'Z',
        _ => 'X',
    }
}
