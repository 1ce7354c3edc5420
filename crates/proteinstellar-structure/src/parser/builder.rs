//! Dialect-independent assembly of atom sites into a [`StructureRecord`].
//!
//! Dialects only tokenize their records into [`AtomSite`]s; ordering rules,
//! alternate locations and confidence normalization live here so every
//! dialect enforces them identically.

use proteinstellar_common::Fingerprint;
use std::collections::HashMap;
use tracing::debug;

use super::{ConfidenceScale, ParseError, ParserOptions};
use crate::model::{
    Atom, Chain, ParseWarning, Residue, ResidueId, SourceMetadata, StructureRecord, WarningKind,
};

const WATER_NAMES: &[&str] = &["HOH", "WAT", "DOD", "H2O"];

/// One coordinate record as read by a dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomSite {
    /// 1-based line of the record, for error messages
    pub line: usize,
    pub hetero: bool,
    pub serial: Option<i64>,
    pub name: String,
    pub alt_loc: Option<char>,
    pub res_name: String,
    pub chain_id: String,
    pub seq_num: i32,
    pub insertion_code: Option<char>,
    pub coord: [f64; 3],
    pub occupancy: Option<f64>,
    pub b_factor: Option<f64>,
    pub element: Option<String>,
}

/// Everything a dialect extracts from one file.
#[derive(Debug, Clone, Default)]
pub struct DialectOutput {
    /// Atom sites of the first model, in file order
    pub sites: Vec<AtomSite>,
    /// Declared residue count per chain (PDB SEQRES), when the file has one
    pub declared_lengths: HashMap<String, usize>,
    /// The file carried its mandatory coordinate section, even if empty
    pub has_coordinate_section: bool,
    /// Total models seen, including the kept one
    pub model_count: usize,
}

struct ResidueAcc {
    residue: Residue,
    raw_b: Vec<Option<f64>>,
}

struct ChainAcc {
    id: String,
    residues: Vec<ResidueAcc>,
}

pub(crate) fn assemble(
    dialect: &'static str,
    output: DialectOutput,
    options: &ParserOptions,
    raw: &str,
) -> Result<StructureRecord, ParseError> {
    if output.sites.is_empty() && !output.has_coordinate_section {
        return Err(ParseError::malformed(dialect, None, "no coordinate records found"));
    }

    let mut chains: Vec<ChainAcc> = Vec::new();
    let mut chain_index: HashMap<String, usize> = HashMap::new();
    let mut current: Option<(usize, usize)> = None;
    let mut altloc_skipped = 0usize;

    for site in output.sites {
        if WATER_NAMES.contains(&site.res_name.as_str()) {
            continue;
        }

        let ci = *chain_index.entry(site.chain_id.clone()).or_insert_with(|| {
            chains.push(ChainAcc { id: site.chain_id.clone(), residues: Vec::new() });
            chains.len() - 1
        });
        let chain = &mut chains[ci];
        let key = (site.seq_num, site.insertion_code);

        let last_key = chain.residues.last().map(|r| r.residue.key());
        let ri = match last_key {
            Some(last) if last == key => {
                let ri = chain.residues.len() - 1;
                if current != Some((ci, ri)) {
                    return Err(ParseError::malformed(
                        dialect,
                        Some(site.line),
                        format!(
                            "atoms of residue {} {} in chain {} are not contiguous",
                            site.res_name, site.seq_num, site.chain_id
                        ),
                    ));
                }
                let acc = &chain.residues[ri];
                if acc.residue.name != site.res_name {
                    return Err(ParseError::malformed(
                        dialect,
                        Some(site.line),
                        format!(
                            "residue {} in chain {} is named both {} and {}",
                            site.seq_num, site.chain_id, acc.residue.name, site.res_name
                        ),
                    ));
                }
                if acc.residue.atom(&site.name).is_some() {
                    if site.alt_loc.is_some() {
                        altloc_skipped += 1;
                        continue;
                    }
                    return Err(ParseError::malformed(
                        dialect,
                        Some(site.line),
                        format!(
                            "duplicate atom {} in residue {} {} of chain {}",
                            site.name, site.res_name, site.seq_num, site.chain_id
                        ),
                    ));
                }
                ri
            }
            Some(last) if key < last => {
                return Err(ParseError::malformed(
                    dialect,
                    Some(site.line),
                    format!(
                        "residue {}{} in chain {} appears after residue {}; residue order is inconsistent",
                        site.seq_num,
                        site.insertion_code.map(String::from).unwrap_or_default(),
                        site.chain_id,
                        last.0
                    ),
                ));
            }
            _ => {
                if let Some(&declared) = output.declared_lengths.get(&site.chain_id) {
                    if site.seq_num < 1 || site.seq_num as usize > declared {
                        return Err(ParseError::malformed(
                            dialect,
                            Some(site.line),
                            format!(
                                "atom references residue {} of chain {}, but only 1..={} are declared",
                                site.seq_num, site.chain_id, declared
                            ),
                        ));
                    }
                }
                let mut residue = Residue::new(site.res_name.clone(), site.seq_num);
                residue.insertion_code = site.insertion_code;
                residue.hetero = site.hetero;
                chain.residues.push(ResidueAcc { residue, raw_b: Vec::new() });
                chain.residues.len() - 1
            }
        };

        let acc = &mut chain.residues[ri];
        acc.raw_b.push(site.b_factor);
        acc.residue.atoms.push(Atom {
            serial: site.serial,
            element: site.element.unwrap_or_else(|| element_from_name(&site.name)),
            name: site.name,
            coord: site.coord,
            occupancy: site.occupancy.unwrap_or(1.0),
            confidence: None,
            residue: ResidueId { chain: ci, residue: ri },
        });
        current = Some((ci, ri));
    }

    let mut warnings = Vec::new();
    let divisor = confidence_divisor(options.confidence_scale, &chains);
    let mut clamped = 0usize;

    let chains: Vec<Chain> = chains
        .into_iter()
        .map(|chain| Chain {
            id: chain.id,
            residues: chain
                .residues
                .into_iter()
                .map(|mut acc| {
                    for (atom, raw) in acc.residue.atoms.iter_mut().zip(acc.raw_b) {
                        atom.confidence = raw.map(|b| {
                            let value = b / divisor;
                            if !(0.0..=1.0).contains(&value) {
                                clamped += 1;
                            }
                            value.clamp(0.0, 1.0)
                        });
                    }
                    acc.residue
                })
                .collect(),
        })
        .collect();

    if clamped > 0 {
        warnings.push(ParseWarning::new(
            WarningKind::ConfidenceClamped,
            format!("{} atom confidence value(s) outside [0, 1] were clamped", clamped),
        ));
    }
    if altloc_skipped > 0 {
        warnings.push(ParseWarning::new(
            WarningKind::AltLocSkipped,
            format!("{} alternate-location atom(s) skipped; first location kept", altloc_skipped),
        ));
    }
    if output.model_count > 1 {
        warnings.push(ParseWarning::new(
            WarningKind::ExtraModelsIgnored,
            format!("{} additional model(s) ignored; only the first is kept", output.model_count - 1),
        ));
    }

    let source = SourceMetadata {
        dialect: dialect.to_string(),
        checksum: Fingerprint::of_bytes(raw.as_bytes()).to_string(),
        engine: None,
        completed_at: None,
        model_count: output.model_count.max(1),
    };

    let record = StructureRecord::assemble(chains, source, warnings)?;
    debug!(
        dialect,
        chains = record.chains().len(),
        residues = record.residue_count(),
        atoms = record.atom_count(),
        "Assembled structure record"
    );
    Ok(record)
}

/// Pick the scale divisor. `Auto` treats the file as 0-100 (pLDDT style) as
/// soon as any raw value exceeds 1.0.
fn confidence_divisor(scale: ConfidenceScale, chains: &[ChainAcc]) -> f64 {
    match scale {
        ConfidenceScale::Fraction => 1.0,
        ConfidenceScale::Percent => 100.0,
        ConfidenceScale::Auto => {
            let percent = chains
                .iter()
                .flat_map(|c| c.residues.iter())
                .flat_map(|r| r.raw_b.iter())
                .flatten()
                .any(|&b| b > 1.0);
            if percent { 100.0 } else { 1.0 }
        }
    }
}

/// Element symbol guessed from an atom name: its first alphabetic character.
fn element_from_name(name: &str) -> String {
    name.chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(line: usize, chain: &str, seq: i32, res: &str, name: &str, b: Option<f64>) -> AtomSite {
        AtomSite {
            line,
            hetero: false,
            serial: Some(line as i64),
            name: name.to_string(),
            alt_loc: None,
            res_name: res.to_string(),
            chain_id: chain.to_string(),
            seq_num: seq,
            insertion_code: None,
            coord: [line as f64, 0.0, 0.0],
            occupancy: None,
            b_factor: b,
            element: None,
        }
    }

    fn output(sites: Vec<AtomSite>) -> DialectOutput {
        DialectOutput { sites, has_coordinate_section: true, model_count: 1, ..Default::default() }
    }

    #[test]
    fn test_groups_sites_into_residues() {
        let out = output(vec![
            site(1, "A", 1, "MET", "N", Some(90.0)),
            site(2, "A", 1, "MET", "CA", Some(90.0)),
            site(3, "A", 2, "LYS", "CA", Some(40.0)),
            site(4, "B", 1, "GLY", "CA", None),
        ]);
        let record = assemble("test", out, &ParserOptions::default(), "raw").unwrap();
        assert_eq!(record.chains().len(), 2);
        assert_eq!(record.residue_count(), 3);
        assert_eq!(record.confidence(), &[Some(0.9), Some(0.4), None]);
        assert_eq!(record.chains()[0].residues[0].atoms[0].element, "N");
        assert_eq!(record.source().dialect, "test");
    }

    #[test]
    fn test_keeps_file_order_within_residue() {
        let out = output(vec![
            site(1, "A", 1, "ALA", "CB", None),
            site(2, "A", 1, "ALA", "N", None),
            site(3, "A", 1, "ALA", "CA", None),
        ]);
        let record = assemble("test", out, &ParserOptions::default(), "").unwrap();
        let names: Vec<_> = record.chains()[0].residues[0].atoms.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["CB", "N", "CA"]);
    }

    #[test]
    fn test_rejects_backwards_residue() {
        let out = output(vec![
            site(1, "A", 2, "ALA", "CA", None),
            site(2, "A", 1, "GLY", "CA", None),
        ]);
        let err = assemble("test", out, &ParserOptions::default(), "").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: Some(2), .. }));
    }

    #[test]
    fn test_rejects_interleaved_residue() {
        let out = output(vec![
            site(1, "A", 1, "ALA", "CA", None),
            site(2, "B", 1, "GLY", "CA", None),
            site(3, "A", 1, "ALA", "CB", None),
        ]);
        assert!(assemble("test", out, &ParserOptions::default(), "").is_err());
    }

    #[test]
    fn test_rejects_undeclared_residue() {
        let mut out = output(vec![site(1, "A", 5, "ALA", "CA", None)]);
        out.declared_lengths.insert("A".to_string(), 3);
        let err = assemble("test", out, &ParserOptions::default(), "").unwrap_err();
        assert!(err.to_string().contains("declared"));
    }

    #[test]
    fn test_clamps_with_warning() {
        let out = output(vec![
            site(1, "A", 1, "ALA", "CA", Some(0.5)),
            site(2, "A", 2, "ALA", "CA", Some(-0.2)),
        ]);
        let record = assemble("test", out, &ParserOptions::default(), "").unwrap();
        assert_eq!(record.confidence(), &[Some(0.5), Some(0.0)]);
        assert_eq!(record.warnings()[0].kind, WarningKind::ConfidenceClamped);
    }

    #[test]
    fn test_alt_loc_keeps_first() {
        let mut a = site(1, "A", 1, "SER", "OG", None);
        a.alt_loc = Some('A');
        let mut b = site(2, "A", 1, "SER", "OG", None);
        b.alt_loc = Some('B');
        let record = assemble("test", output(vec![a, b]), &ParserOptions::default(), "").unwrap();
        assert_eq!(record.atom_count(), 1);
        assert_eq!(record.chains()[0].residues[0].atoms[0].coord[0], 1.0);
        assert_eq!(record.warnings()[0].kind, WarningKind::AltLocSkipped);
    }

    #[test]
    fn test_skips_water_and_requires_coordinates() {
        let out = output(vec![site(1, "A", 100, "HOH", "O", None)]);
        let record = assemble("test", out, &ParserOptions::default(), "").unwrap();
        assert!(record.is_empty());

        let missing = DialectOutput::default();
        assert!(assemble("test", missing, &ParserOptions::default(), "").is_err());
    }
}
