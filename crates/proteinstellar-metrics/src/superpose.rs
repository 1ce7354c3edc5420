//! Optimal rigid-body superposition and the similarity scores built on it.
//!
//! The rotation comes from the largest eigenvector of Horn's 4x4 quaternion
//! matrix, which always yields a proper rotation (no reflection case to fix
//! up). Scores are evaluated on per-pair deviations after the fit.

type Mat3 = [[f64; 3]; 3];
type Mat4 = [[f64; 4]; 4];

/// GDT-TS distance cutoffs in Å.
pub const GDT_CUTOFFS: [f64; 4] = [1.0, 2.0, 4.0, 8.0];

const MAX_SWEEPS: usize = 64;

fn centroid(points: &[[f64; 3]]) -> [f64; 3] {
    let n = points.len() as f64;
    let mut c = [0.0; 3];
    for p in points {
        for k in 0..3 {
            c[k] += p[k];
        }
    }
    [c[0] / n, c[1] / n, c[2] / n]
}

fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn matvec(m: &Mat3, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// H[a][b] = sum of mobile_a * target_b over centered pairs.
fn correlation(mobile: &[[f64; 3]], target: &[[f64; 3]], cm: &[f64; 3], ct: &[f64; 3]) -> Mat3 {
    let mut h = [[0.0; 3]; 3];
    for (m, t) in mobile.iter().zip(target) {
        let (m, t) = (sub(m, cm), sub(t, ct));
        for a in 0..3 {
            for b in 0..3 {
                h[a][b] += m[a] * t[b];
            }
        }
    }
    h
}

fn horn_matrix(h: &Mat3) -> Mat4 {
    [
        [h[0][0] + h[1][1] + h[2][2], h[1][2] - h[2][1], h[2][0] - h[0][2], h[0][1] - h[1][0]],
        [h[1][2] - h[2][1], h[0][0] - h[1][1] - h[2][2], h[0][1] + h[1][0], h[0][2] + h[2][0]],
        [h[2][0] - h[0][2], h[0][1] + h[1][0], -h[0][0] + h[1][1] - h[2][2], h[1][2] + h[2][1]],
        [h[0][1] - h[1][0], h[0][2] + h[2][0], h[1][2] + h[2][1], -h[0][0] - h[1][1] + h[2][2]],
    ]
}

/// Cyclic Jacobi on a symmetric 4x4. Returns eigenvalues and the eigenvector
/// matrix (eigenvectors in columns).
fn jacobi_eigen(mut a: Mat4) -> ([f64; 4], Mat4) {
    let mut v = [[0.0; 4]; 4];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        let mut total = 0.0;
        for p in 0..4 {
            for q in 0..4 {
                total += a[p][q] * a[p][q];
                if p != q {
                    off += a[p][q] * a[p][q];
                }
            }
        }
        if off == 0.0 || off <= 1e-30 * total {
            break;
        }

        for p in 0..3 {
            for q in (p + 1)..4 {
                if a[p][q] == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = if theta.abs() > 1e150 {
                    0.5 / theta
                } else {
                    theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..4 {
                    let (akp, akq) = (a[k][p], a[k][q]);
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..4 {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    ([a[0][0], a[1][1], a[2][2], a[3][3]], v)
}

/// Unit quaternion (w, x, y, z) to rotation matrix.
fn quaternion_to_matrix(q: [f64; 4]) -> Mat3 {
    let [w, x, y, z] = q;
    [
        [w * w + x * x - y * y - z * z, 2.0 * (x * y - w * z), 2.0 * (x * z + w * y)],
        [2.0 * (x * y + w * z), w * w - x * x + y * y - z * z, 2.0 * (y * z - w * x)],
        [2.0 * (x * z - w * y), 2.0 * (y * z + w * x), w * w - x * x - y * y + z * z],
    ]
}

/// Rotation and translation that best map `mobile` points onto `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Superposition {
    rotation: Mat3,
    mobile_centroid: [f64; 3],
    target_centroid: [f64; 3],
}

impl Superposition {
    /// Least-squares fit over corresponding points. `None` when the point
    /// sets are empty or differ in length.
    pub fn fit(mobile: &[[f64; 3]], target: &[[f64; 3]]) -> Option<Self> {
        if mobile.is_empty() || mobile.len() != target.len() {
            return None;
        }
        let mobile_centroid = centroid(mobile);
        let target_centroid = centroid(target);
        let k = horn_matrix(&correlation(mobile, target, &mobile_centroid, &target_centroid));
        let (values, vectors) = jacobi_eigen(k);

        let best = (1..4).fold(0, |best, i| if values[i] > values[best] { i } else { best });
        let mut q = [vectors[0][best], vectors[1][best], vectors[2][best], vectors[3][best]];
        let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
        let sign = if q[0] < 0.0 { -1.0 } else { 1.0 };
        for c in &mut q {
            *c *= sign / norm;
        }

        Some(Self { rotation: quaternion_to_matrix(q), mobile_centroid, target_centroid })
    }

    pub fn rotation(&self) -> &[[f64; 3]; 3] {
        &self.rotation
    }

    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        let r = matvec(&self.rotation, sub(point, &self.mobile_centroid));
        [r[0] + self.target_centroid[0], r[1] + self.target_centroid[1], r[2] + self.target_centroid[2]]
    }

    /// Distance of each fitted mobile point from its target.
    pub fn deviations(&self, mobile: &[[f64; 3]], target: &[[f64; 3]]) -> Vec<f64> {
        mobile
            .iter()
            .zip(target)
            .map(|(m, t)| {
                let d = sub(&self.apply(m), t);
                (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
            })
            .collect()
    }
}

pub fn rmsd(deviations: &[f64]) -> Option<f64> {
    if deviations.is_empty() {
        return None;
    }
    let sum: f64 = deviations.iter().map(|d| d * d).sum();
    Some((sum / deviations.len() as f64).sqrt())
}

/// Distance scale for a reference of `length` residues, floored at 0.5 Å.
pub fn tm_d0(length: usize) -> f64 {
    (1.24 * (length as f64 - 15.0).cbrt() - 1.8).max(0.5)
}

/// TM-like score normalized by the reference length. Unaligned reference
/// residues contribute nothing.
pub fn tm_score(deviations: &[f64], reference_length: usize) -> Option<f64> {
    if reference_length == 0 {
        return None;
    }
    let d0 = tm_d0(reference_length);
    let sum: f64 = deviations.iter().map(|d| 1.0 / (1.0 + (d / d0) * (d / d0))).sum();
    Some(sum / reference_length as f64)
}

/// Mean over [`GDT_CUTOFFS`] of the fraction of reference residues within
/// each cutoff, in [0, 1].
pub fn gdt_ts(deviations: &[f64], reference_length: usize) -> Option<f64> {
    if reference_length == 0 {
        return None;
    }
    let fractions: f64 = GDT_CUTOFFS
        .iter()
        .map(|&cutoff| deviations.iter().filter(|&&d| d <= cutoff).count() as f64 / reference_length as f64)
        .sum();
    Some(fractions / GDT_CUTOFFS.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn cloud(seed: u64, n: usize) -> Vec<[f64; 3]> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| [rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0)])
            .collect()
    }

    /// Rotation by `angle` about the (normalized) `axis`.
    fn rotate(points: &[[f64; 3]], axis: [f64; 3], angle: f64, shift: [f64; 3]) -> Vec<[f64; 3]> {
        let n = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        let half = angle / 2.0;
        let s = half.sin() / n;
        let r = quaternion_to_matrix([half.cos(), axis[0] * s, axis[1] * s, axis[2] * s]);
        points
            .iter()
            .map(|p| {
                let q = matvec(&r, *p);
                [q[0] + shift[0], q[1] + shift[1], q[2] + shift[2]]
            })
            .collect()
    }

    fn rmsd_of(a: &[[f64; 3]], b: &[[f64; 3]]) -> f64 {
        let fit = Superposition::fit(a, b).unwrap();
        rmsd(&fit.deviations(a, b)).unwrap()
    }

    #[test]
    fn test_self_rmsd_is_zero() {
        let points = cloud(1, 50);
        assert!(rmsd_of(&points, &points) < 1e-9);
    }

    #[test]
    fn test_recovers_rigid_motion() {
        let points = cloud(2, 40);
        let moved = rotate(&points, [1.0, 2.0, -0.5], 2.1, [5.0, -3.0, 12.0]);
        let fit = Superposition::fit(&points, &moved).unwrap();
        let dev = fit.deviations(&points, &moved);
        assert!(rmsd(&dev).unwrap() < 1e-9);
        assert!((tm_score(&dev, 40).unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(gdt_ts(&dev, 40), Some(1.0));

        let r = fit.rotation();
        let det = r[0][0] * (r[1][1] * r[2][2] - r[1][2] * r[2][1]) - r[0][1] * (r[1][0] * r[2][2] - r[1][2] * r[2][0])
            + r[0][2] * (r[1][0] * r[2][1] - r[1][1] * r[2][0]);
        assert!((det - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_half_turn_is_recovered() {
        let points = cloud(3, 20);
        let moved = rotate(&points, [0.0, 0.0, 1.0], std::f64::consts::PI, [0.0; 3]);
        assert!(rmsd_of(&points, &moved) < 1e-9);
    }

    #[test]
    fn test_rmsd_is_symmetric() {
        let a = cloud(4, 30);
        let b: Vec<[f64; 3]> = cloud(5, 30).iter().zip(&a).map(|(n, p)| [p[0] + n[0] * 0.1, p[1] + n[1] * 0.1, p[2]]).collect();
        let ab = rmsd_of(&a, &b);
        let ba = rmsd_of(&b, &a);
        assert!(ab > 0.1);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_fit_needs_matching_points() {
        assert!(Superposition::fit(&[], &[]).is_none());
        assert!(Superposition::fit(&[[0.0; 3]], &[[0.0; 3], [1.0; 3]]).is_none());
    }

    #[test]
    fn test_d0_floor_and_scores() {
        assert_eq!(tm_d0(10), 0.5);
        assert!((tm_d0(100) - (1.24 * 85f64.cbrt() - 1.8)).abs() < 1e-12);
        // half the reference residues are unaligned
        assert_eq!(tm_score(&[0.0, 0.0], 4), Some(0.5));
        assert_eq!(gdt_ts(&[0.5, 1.5, 3.0, 10.0], 4), Some((1.0 + 2.0 + 3.0 + 3.0) / 16.0));
        assert_eq!(rmsd(&[]), None);
    }
}
