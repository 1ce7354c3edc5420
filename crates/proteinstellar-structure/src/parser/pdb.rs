//! Legacy fixed-width PDB format.

use super::{AtomSite, DialectOutput, ParseError, StructureDialect};

const DIALECT: &str = "pdb";

/// Record names that identify a PDB file.
const KNOWN_RECORDS: &[&str] = &[
    "HEADER", "TITLE", "COMPND", "SOURCE", "KEYWDS", "EXPDTA", "AUTHOR", "REVDAT", "JRNL",
    "REMARK", "DBREF", "SEQRES", "HET", "HETNAM", "FORMUL", "HELIX", "SHEET", "SSBOND",
    "CRYST1", "ORIGX1", "SCALE1", "MODEL", "ATOM", "HETATM", "ANISOU", "TER", "ENDMDL",
    "CONECT", "MASTER", "END", "PARENT",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct PdbDialect;

impl StructureDialect for PdbDialect {
    fn name(&self) -> &'static str {
        DIALECT
    }

    fn detect(&self, text: &str) -> bool {
        text.lines().any(|line| KNOWN_RECORDS.contains(&record_name(line)))
    }

    fn read(&self, text: &str) -> Result<DialectOutput, ParseError> {
        let mut out = DialectOutput::default();
        let mut in_extra_model = false;

        for (idx, line) in text.lines().enumerate() {
            let line_num = idx + 1;
            let line = line.trim_end_matches('\r');

            match record_name(line) {
                "MODEL" => {
                    out.model_count += 1;
                    in_extra_model = out.model_count > 1;
                }
                "ENDMDL" => {
                    out.has_coordinate_section = true;
                }
                "END" => {
                    out.has_coordinate_section = true;
                    break;
                }
                "SEQRES" => parse_seqres(line, line_num, &mut out)?,
                "ATOM" | "HETATM" => {
                    out.has_coordinate_section = true;
                    if !in_extra_model {
                        out.sites.push(parse_atom(line, line_num)?);
                    }
                }
                _ => {}
            }
        }

        if out.model_count == 0 && !out.sites.is_empty() {
            out.model_count = 1;
        }
        Ok(out)
    }
}

fn record_name(line: &str) -> &str {
    column(line, 0, 6).trim_end()
}

/// Fixed-width column slice; short lines yield a shorter or empty field.
fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).unwrap_or("")
}

fn column_char(line: &str, idx: usize) -> Option<char> {
    column(line, idx, idx + 1).chars().next().filter(|c| !c.is_whitespace())
}

fn parse_seqres(line: &str, line_num: usize, out: &mut DialectOutput) -> Result<(), ParseError> {
    let chain_id = column(line, 11, 12).trim().to_string();
    let count = column(line, 13, 17).trim();
    let count: usize = count.parse().map_err(|_| {
        ParseError::malformed(DIALECT, Some(line_num), format!("SEQRES residue count {:?} is not a number", count))
    })?;
    out.declared_lengths.entry(chain_id).or_insert(count);
    Ok(())
}

fn parse_atom(line: &str, line_num: usize) -> Result<AtomSite, ParseError> {
    if !line.is_ascii() {
        return Err(ParseError::malformed(DIALECT, Some(line_num), "coordinate record contains non-ASCII text"));
    }
    if line.len() < 54 {
        return Err(ParseError::malformed(
            DIALECT,
            Some(line_num),
            format!("coordinate record truncated at {} columns", line.len()),
        ));
    }

    let seq_str = column(line, 22, 26).trim();
    let seq_num: i32 = seq_str.parse().map_err(|_| {
        ParseError::malformed(DIALECT, Some(line_num), format!("residue number {:?} is not an integer", seq_str))
    })?;

    let coord = [
        parse_coordinate(column(line, 30, 38), "x", line_num)?,
        parse_coordinate(column(line, 38, 46), "y", line_num)?,
        parse_coordinate(column(line, 46, 54), "z", line_num)?,
    ];

    let element = column(line, 76, 78).trim();
    Ok(AtomSite {
        line: line_num,
        hetero: record_name(line) == "HETATM",
        serial: column(line, 6, 11).trim().parse().ok(),
        name: column(line, 12, 16).trim().to_string(),
        alt_loc: column_char(line, 16),
        res_name: column(line, 17, 20).trim().to_string(),
        chain_id: column(line, 21, 22).trim().to_string(),
        seq_num,
        insertion_code: column_char(line, 26),
        coord,
        occupancy: parse_optional(column(line, 54, 60), "occupancy", line_num)?,
        b_factor: parse_optional(column(line, 60, 66), "B-factor", line_num)?,
        element: (!element.is_empty()).then(|| element.to_ascii_uppercase()),
    })
}

fn parse_coordinate(field: &str, axis: &str, line_num: usize) -> Result<f64, ParseError> {
    let value = field.trim();
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            ParseError::malformed(DIALECT, Some(line_num), format!("{} coordinate {:?} is not numeric", axis, value))
        })
}

/// Blank fields are missing; anything else must be a finite number.
fn parse_optional(field: &str, what: &str, line_num: usize) -> Result<Option<f64>, ParseError> {
    let value = field.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ParseError::malformed(DIALECT, Some(line_num), format!("{} {:?} is not numeric", what, value)))
}
