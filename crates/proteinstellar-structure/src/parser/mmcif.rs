//! PDBx/mmCIF, restricted to the `_atom_site` loop.

use std::collections::{HashMap, HashSet};

use super::{AtomSite, DialectOutput, ParseError, StructureDialect};

const DIALECT: &str = "mmcif";

#[derive(Debug, Clone, Copy, Default)]
pub struct MmcifDialect;

impl StructureDialect for MmcifDialect {
    fn name(&self) -> &'static str {
        DIALECT
    }

    fn detect(&self, text: &str) -> bool {
        text.lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.starts_with("data_"))
            .unwrap_or(false)
    }

    fn read(&self, text: &str) -> Result<DialectOutput, ParseError> {
        let (headers, rows) = extract_atom_site_loop(text)?;
        let columns = AtomSiteColumns::resolve(&headers)?;

        let mut out = DialectOutput { has_coordinate_section: true, ..Default::default() };
        let mut first_model: Option<String> = None;
        let mut other_models: HashSet<String> = HashSet::new();

        for (line, values) in rows {
            if let Some(idx) = columns.model {
                let model = &values[idx];
                if first_model.is_none() {
                    first_model = Some(model.clone());
                } else if first_model.as_ref() != Some(model) {
                    other_models.insert(model.clone());
                    continue;
                }
            }
            out.sites.push(columns.site(&values, line)?);
        }

        out.model_count = if out.sites.is_empty() && first_model.is_none() { 0 } else { 1 + other_models.len() };
        Ok(out)
    }
}

/// Header names (without the `_atom_site.` prefix) and rows tagged with the
/// line each row starts on.
type LoopContents = (Vec<String>, Vec<(usize, Vec<String>)>);

fn extract_atom_site_loop(text: &str) -> Result<LoopContents, ParseError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].trim() == "loop_" && lines.get(i + 1).map_or(false, |l| l.trim_start().starts_with("_atom_site.")) {
            i += 1;
            let mut headers = Vec::new();
            while i < lines.len() {
                let l = lines[i].trim();
                match l.strip_prefix("_atom_site.") {
                    Some(name) => headers.push(name.split_whitespace().next().unwrap_or("").to_string()),
                    None => break,
                }
                i += 1;
            }

            let mut tokens: Vec<(usize, String)> = Vec::new();
            while i < lines.len() {
                let raw = lines[i];
                let l = raw.trim();
                if l.starts_with("loop_") || l.starts_with('_') || l.starts_with("data_") || l.starts_with('#') {
                    break;
                }
                if raw.starts_with(';') {
                    // multi-line text field: everything up to the closing ';' is one value
                    let start = i + 1;
                    let mut value = raw[1..].to_string();
                    i += 1;
                    while i < lines.len() && !lines[i].starts_with(';') {
                        value.push('\n');
                        value.push_str(lines[i]);
                        i += 1;
                    }
                    if i == lines.len() {
                        return Err(ParseError::malformed(DIALECT, Some(start), "unterminated text field"));
                    }
                    tokens.push((start, value));
                    i += 1;
                    continue;
                }
                for tok in tokenize(l, i + 1)? {
                    tokens.push((i + 1, tok));
                }
                i += 1;
            }

            if headers.is_empty() {
                return Err(ParseError::malformed(DIALECT, Some(i), "_atom_site loop has no columns"));
            }
            if tokens.len() % headers.len() != 0 {
                return Err(ParseError::malformed(
                    DIALECT,
                    tokens.last().map(|t| t.0),
                    format!(
                        "_atom_site loop has {} values, not a multiple of its {} columns",
                        tokens.len(),
                        headers.len()
                    ),
                ));
            }

            let rows = tokens
                .chunks(headers.len())
                .map(|chunk| (chunk[0].0, chunk.iter().map(|(_, v)| v.clone()).collect()))
                .collect();
            return Ok((headers, rows));
        }
        i += 1;
    }

    Err(ParseError::malformed(DIALECT, None, "missing mandatory _atom_site loop"))
}

/// Split a CIF data line into values. Quoted values may contain spaces; a
/// quote only closes when followed by whitespace or end of line.
fn tokenize(line: &str, line_num: usize) -> Result<Vec<String>, ParseError> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '\'' || c == '"' {
            let start = i + 1;
            let mut j = start;
            loop {
                if j >= chars.len() {
                    return Err(ParseError::malformed(DIALECT, Some(line_num), "unterminated quoted value"));
                }
                if chars[j] == c && (j + 1 == chars.len() || chars[j + 1].is_whitespace()) {
                    break;
                }
                j += 1;
            }
            tokens.push(chars[start..j].iter().collect());
            i = j + 1;
        } else {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        }
    }

    Ok(tokens)
}

struct AtomSiteColumns {
    group: Option<usize>,
    id: Option<usize>,
    element: Option<usize>,
    atom: usize,
    alt: Option<usize>,
    comp: usize,
    asym: usize,
    seq: usize,
    ins: Option<usize>,
    x: usize,
    y: usize,
    z: usize,
    occupancy: Option<usize>,
    b_factor: Option<usize>,
    model: Option<usize>,
}

impl AtomSiteColumns {
    fn resolve(headers: &[String]) -> Result<Self, ParseError> {
        let index: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h.as_str(), i)).collect();
        let find = |names: &[&str]| names.iter().find_map(|n| index.get(n).copied());
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| {
                ParseError::malformed(DIALECT, None, format!("_atom_site loop lacks column {}", names.join(" / ")))
            })
        };

        Ok(Self {
            group: find(&["group_PDB"]),
            id: find(&["id"]),
            element: find(&["type_symbol"]),
            atom: require(&["auth_atom_id", "label_atom_id"])?,
            alt: find(&["label_alt_id"]),
            comp: require(&["auth_comp_id", "label_comp_id"])?,
            asym: require(&["auth_asym_id", "label_asym_id"])?,
            seq: require(&["auth_seq_id", "label_seq_id"])?,
            ins: find(&["pdbx_PDB_ins_code"]),
            x: require(&["Cartn_x"])?,
            y: require(&["Cartn_y"])?,
            z: require(&["Cartn_z"])?,
            occupancy: find(&["occupancy"]),
            b_factor: find(&["B_iso_or_equiv"]),
            model: find(&["pdbx_PDB_model_num"]),
        })
    }

    fn site(&self, values: &[String], line: usize) -> Result<AtomSite, ParseError> {
        let get = |idx: Option<usize>| idx.and_then(|i| present(&values[i]));

        let seq_raw = &values[self.seq];
        let seq_num: i32 = seq_raw.parse().map_err(|_| {
            ParseError::malformed(DIALECT, Some(line), format!("residue number {:?} is not an integer", seq_raw))
        })?;

        Ok(AtomSite {
            line,
            hetero: get(self.group) == Some("HETATM"),
            serial: get(self.id).and_then(|s| s.parse().ok()),
            name: values[self.atom].clone(),
            alt_loc: get(self.alt).and_then(|s| s.chars().next()),
            res_name: values[self.comp].clone(),
            chain_id: values[self.asym].clone(),
            seq_num,
            insertion_code: get(self.ins).and_then(|s| s.chars().next()),
            coord: [
                parse_number(&values[self.x], "Cartn_x", line)?,
                parse_number(&values[self.y], "Cartn_y", line)?,
                parse_number(&values[self.z], "Cartn_z", line)?,
            ],
            occupancy: get(self.occupancy).map(|s| parse_number(s, "occupancy", line)).transpose()?,
            b_factor: get(self.b_factor).map(|s| parse_number(s, "B_iso_or_equiv", line)).transpose()?,
            element: get(self.element).map(|s| s.to_ascii_uppercase()),
        })
    }
}

/// `.` and `?` mark inapplicable and unknown values.
fn present(value: &str) -> Option<&str> {
    match value {
        "." | "?" => None,
        v => Some(v),
    }
}

fn parse_number(value: &str, what: &str, line: usize) -> Result<f64, ParseError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::malformed(DIALECT, Some(line), format!("{} {:?} is not numeric", what, value)))
}
