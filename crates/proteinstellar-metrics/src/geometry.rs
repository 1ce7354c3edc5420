//! Structured geometry tables over representative atoms.

use proteinstellar_structure::{distance_squared, StructureRecord};

use crate::value::Matrix;

/// Pairwise distances in Å between representative atoms, flattened residue
/// order on both axes.
pub fn distance_matrix(record: &StructureRecord) -> Matrix {
    let coords = record.representative_coords();
    let n = coords.len();
    let mut matrix = Matrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distance_squared(&coords[i], &coords[j]).sqrt();
            matrix.set(i, j, d);
            matrix.set(j, i, d);
        }
    }
    matrix
}

/// 1.0 where two residues are in contact, 0.0 elsewhere. Same-chain pairs
/// closer than `min_separation` along the chain are never contacts.
pub fn contact_map(record: &StructureRecord, cutoff: f64, min_separation: usize) -> Matrix {
    let coords = record.representative_coords();
    let chains = record.residue_chain_indices();
    let cutoff_sq = cutoff * cutoff;
    let n = coords.len();
    let mut matrix = Matrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let eligible = chains[i] != chains[j] || j - i >= min_separation;
            if eligible && distance_squared(&coords[i], &coords[j]) <= cutoff_sq {
                matrix.set(i, j, 1.0);
                matrix.set(j, i, 1.0);
            }
        }
    }
    matrix
}

pub fn centroid(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let mut c = [0.0; 3];
    for p in points {
        c[0] += p[0];
        c[1] += p[1];
        c[2] += p[2];
    }
    Some([c[0] / n, c[1] / n, c[2] / n])
}

/// Root-mean-square distance of the points from their centroid.
pub fn radius_of_gyration(points: &[[f64; 3]]) -> Option<f64> {
    let c = centroid(points)?;
    let sum: f64 = points.iter().map(|p| distance_squared(p, &c)).sum();
    Some((sum / points.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(n: usize) -> StructureRecord {
        let coords: Vec<[f64; 3]> = (0..n).map(|i| [i as f64 * 3.8, 0.0, 0.0]).collect();
        StructureRecord::from_ca_trace("A", &coords, None).unwrap()
    }

    #[test]
    fn test_distance_matrix_is_symmetric() {
        let m = distance_matrix(&trace(4));
        assert_eq!((m.rows, m.cols), (4, 4));
        assert_eq!(m.get(0, 0), Some(0.0));
        assert!((m.get(0, 3).unwrap() - 11.4).abs() < 1e-9);
        assert_eq!(m.get(0, 3), m.get(3, 0));
        assert_eq!(m.get(4, 0), None);
    }

    #[test]
    fn test_contact_map_respects_separation() {
        let m = contact_map(&trace(4), 8.0, 2);
        assert_eq!(m.row(0).unwrap(), &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(m.get(2, 0), Some(1.0));
    }

    #[test]
    fn test_radius_of_gyration() {
        let points = [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]];
        assert_eq!(radius_of_gyration(&points), Some(1.0));
        assert_eq!(radius_of_gyration(&[]), None);
    }
}
