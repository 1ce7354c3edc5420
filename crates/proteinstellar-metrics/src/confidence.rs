//! Per-residue confidence summaries. Residues without a confidence value are
//! left out of every summary.

fn known(confidence: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    confidence.iter().filter_map(|c| *c)
}

pub fn mean(confidence: &[Option<f64>]) -> Option<f64> {
    let (sum, n) = known(confidence).fold((0.0, 0usize), |(s, n), c| (s + c, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub fn median(confidence: &[Option<f64>]) -> Option<f64> {
    let mut values: Vec<f64> = known(confidence).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 { (values[mid - 1] + values[mid]) / 2.0 } else { values[mid] })
}

/// Residues whose confidence is strictly below `threshold`.
pub fn low_confidence_count(confidence: &[Option<f64>], threshold: f64) -> usize {
    known(confidence).filter(|&c| c < threshold).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summaries() {
        let conf = [Some(0.9), Some(0.4), Some(0.95)];
        assert!((mean(&conf).unwrap() - 0.75).abs() < 1e-12);
        assert_eq!(median(&conf), Some(0.9));
        assert_eq!(low_confidence_count(&conf, 0.5), 1);
    }

    #[test]
    fn test_unknown_values_are_skipped() {
        let conf = [None, Some(0.2), Some(0.6), None];
        assert!((mean(&conf).unwrap() - 0.4).abs() < 1e-12);
        assert!((median(&conf).unwrap() - 0.4).abs() < 1e-12);
        assert_eq!(low_confidence_count(&conf, 1.0), 2);
        assert_eq!(mean(&[None, None]), None);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_threshold_is_strict() {
        assert_eq!(low_confidence_count(&[Some(0.5)], 0.5), 0);
        assert_eq!(low_confidence_count(&[Some(0.5)], 0.500001), 1);
    }
}
