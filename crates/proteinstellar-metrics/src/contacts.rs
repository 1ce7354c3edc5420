//! Residue contact counting.
//!
//! Two residues are in contact when their representative atoms lie within the
//! cutoff. Pairs on the same chain additionally need an index separation of at
//! least `min_separation`. Counts come from an all-pairs pass or from a
//! uniform grid; both visit the same pairs and give the same numbers.

use proteinstellar_common::ContactStrategy;
use proteinstellar_structure::distance_squared;
use std::collections::HashMap;
use tracing::debug;

/// `Auto` switches to the grid above this many residues.
pub const GRID_THRESHOLD: usize = 1500;

const SENTINEL: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactCounts {
    /// Indexed like the record's chains
    pub per_chain: Vec<u64>,
    pub inter_chain: u64,
}

impl ContactCounts {
    pub fn total(&self) -> u64 {
        self.per_chain.iter().sum::<u64>() + self.inter_chain
    }
}

/// Residue positions with the chain each one belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ContactInput<'a> {
    pub coords: &'a [[f64; 3]],
    /// Chain index per residue, non-decreasing
    pub chains: &'a [usize],
    pub chain_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    cutoff_sq: f64,
    min_separation: usize,
}

impl Rule {
    fn eligible(&self, input: &ContactInput<'_>, i: usize, j: usize) -> bool {
        input.chains[i] != input.chains[j] || i.abs_diff(j) >= self.min_separation
    }
}

fn record(counts: &mut ContactCounts, input: &ContactInput<'_>, i: usize, j: usize) {
    let (a, b) = (input.chains[i], input.chains[j]);
    if a == b {
        counts.per_chain[a] += 1;
    } else {
        counts.inter_chain += 1;
    }
}

pub fn count_contacts(
    input: &ContactInput<'_>,
    cutoff: f64,
    min_separation: usize,
    strategy: ContactStrategy,
) -> ContactCounts {
    let rule = Rule { cutoff_sq: cutoff * cutoff, min_separation };
    let use_grid = match strategy {
        ContactStrategy::AllPairs => false,
        ContactStrategy::Grid => true,
        ContactStrategy::Auto => input.coords.len() > GRID_THRESHOLD,
    };
    debug!(residues = input.coords.len(), grid = use_grid, "Counting contacts");
    if use_grid {
        grid_pass(input, rule, cutoff)
    } else {
        all_pairs(input, rule)
    }
}

fn all_pairs(input: &ContactInput<'_>, rule: Rule) -> ContactCounts {
    let mut counts = ContactCounts { per_chain: vec![0; input.chain_count], inter_chain: 0 };
    let n = input.coords.len();
    for i in 0..n {
        for j in (i + 1)..n {
            if rule.eligible(input, i, j) && distance_squared(&input.coords[i], &input.coords[j]) <= rule.cutoff_sq {
                record(&mut counts, input, i, j);
            }
        }
    }
    counts
}

type Cell = (i64, i64, i64);

fn cell_of(p: &[f64; 3], size: f64) -> Cell {
    ((p[0] / size).floor() as i64, (p[1] / size).floor() as i64, (p[2] / size).floor() as i64)
}

/// Cells are keyed by integer coordinates in a hash map, so sparse or widely
/// separated inputs do not allocate a dense box. Each cell holds a linked list
/// through `next`.
fn grid_pass(input: &ContactInput<'_>, rule: Rule, cutoff: f64) -> ContactCounts {
    let mut counts = ContactCounts { per_chain: vec![0; input.chain_count], inter_chain: 0 };
    let n = input.coords.len();
    let mut head: HashMap<Cell, u32> = HashMap::new();
    let mut next = vec![SENTINEL; n];
    for (i, p) in input.coords.iter().enumerate() {
        let slot = head.entry(cell_of(p, cutoff)).or_insert(SENTINEL);
        next[i] = *slot;
        *slot = i as u32;
    }

    for (i, p) in input.coords.iter().enumerate() {
        let (cx, cy, cz) = cell_of(p, cutoff);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(&first) = head.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    let mut j = first;
                    while j != SENTINEL {
                        let ju = j as usize;
                        // each unordered pair is seen from both ends; keep one
                        if ju > i
                            && rule.eligible(input, i, ju)
                            && distance_squared(p, &input.coords[ju]) <= rule.cutoff_sq
                        {
                            record(&mut counts, input, i, ju);
                        }
                        j = next[ju];
                    }
                }
            }
        }
    }
    counts
}
