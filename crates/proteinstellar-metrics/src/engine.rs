//! Self and comparative metrics over [`StructureRecord`]s.

use proteinstellar_common::{AnalysisSettings, StellarError};
use proteinstellar_structure::StructureRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::confidence;
use crate::contacts::{count_contacts, ContactInput};
use crate::error::MetricsError;
use crate::geometry::{contact_map, distance_matrix, radius_of_gyration};
use crate::superpose::{gdt_ts, rmsd, tm_score, Superposition};
use crate::value::{MetricSet, MetricValue};

/// Metric thresholds. Same fields and defaults as the `[analysis]` config
/// section.
pub type MetricsConfig = AnalysisSettings;

pub mod keys {
    pub const MEAN_CONFIDENCE: &str = "mean_confidence";
    pub const MEDIAN_CONFIDENCE: &str = "median_confidence";
    pub const LOW_CONFIDENCE_COUNT: &str = "low_confidence_count";
    pub const RESIDUE_COUNT: &str = "residue_count";
    pub const CHAIN_COUNT: &str = "chain_count";
    pub const CONTACTS_PER_CHAIN: &str = "contacts_per_chain";
    pub const TOTAL_CONTACTS: &str = "total_contacts";
    pub const INTER_CHAIN_CONTACTS: &str = "inter_chain_contacts";
    pub const RADIUS_OF_GYRATION: &str = "radius_of_gyration";
    pub const DISTANCE_MAP: &str = "distance_map";
    pub const CONTACT_MAP: &str = "contact_map";

    pub const RMSD: &str = "rmsd";
    pub const TM_SCORE: &str = "tm_score";
    pub const GDT_TS: &str = "gdt_ts";
    pub const ALIGNED_RESIDUES: &str = "aligned_residues";

    pub const SELF_METRICS: [&str; 11] = [
        MEAN_CONFIDENCE,
        MEDIAN_CONFIDENCE,
        LOW_CONFIDENCE_COUNT,
        RESIDUE_COUNT,
        CHAIN_COUNT,
        CONTACTS_PER_CHAIN,
        TOTAL_CONTACTS,
        INTER_CHAIN_CONTACTS,
        RADIUS_OF_GYRATION,
        DISTANCE_MAP,
        CONTACT_MAP,
    ];
    pub const COMPARATIVE_METRICS: [&str; 4] = [RMSD, TM_SCORE, GDT_TS, ALIGNED_RESIDUES];
}

/// Pairs of flattened residue indices `(model, reference)` to compare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidueMapping {
    pairs: Vec<(usize, usize)>,
}

impl ResidueMapping {
    pub fn new(pairs: Vec<(usize, usize)>) -> Self {
        Self { pairs }
    }

    /// Residue i of the model against residue i of the reference.
    pub fn identity(len: usize) -> Self {
        Self { pairs: (0..len).map(|i| (i, i)).collect() }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Every index in range and used at most once on each side.
    fn check(&self, model_len: usize, reference_len: usize) -> Result<(), MetricsError> {
        let mut seen_model = HashSet::new();
        let mut seen_reference = HashSet::new();
        for &(m, r) in &self.pairs {
            if m >= model_len || r >= reference_len {
                return Err(MetricsError::InvalidMapping(format!(
                    "pair ({}, {}) is out of range for {} model and {} reference residues",
                    m, r, model_len, reference_len
                )));
            }
            if !seen_model.insert(m) || !seen_reference.insert(r) {
                return Err(MetricsError::InvalidMapping(format!("pair ({}, {}) reuses a residue", m, r)));
            }
        }
        Ok(())
    }
}

/// Stateless apart from its thresholds; safe to share across worker threads.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    config: MetricsConfig,
}

impl MetricsEngine {
    pub fn new(config: MetricsConfig) -> Result<Self, StellarError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn self_metrics(&self, record: &StructureRecord) -> MetricSet {
        let mut set = MetricSet::new();
        if record.is_empty() {
            for key in keys::SELF_METRICS {
                set.insert(key, MetricValue::Undefined);
            }
            return set;
        }

        let conf = record.confidence();
        set.insert(keys::MEAN_CONFIDENCE, confidence::mean(conf).into());
        set.insert(keys::MEDIAN_CONFIDENCE, confidence::median(conf).into());
        set.insert(
            keys::LOW_CONFIDENCE_COUNT,
            MetricValue::Count(confidence::low_confidence_count(conf, self.config.confidence_threshold) as u64),
        );
        set.insert(keys::RESIDUE_COUNT, MetricValue::Count(record.residue_count() as u64));
        set.insert(keys::CHAIN_COUNT, MetricValue::Count(record.chains().len() as u64));

        let coords = record.representative_coords();
        let chains = record.residue_chain_indices();
        let input = ContactInput { coords: &coords, chains: &chains, chain_count: record.chains().len() };
        let counts = count_contacts(
            &input,
            self.config.contact_cutoff,
            self.config.min_sequence_separation,
            self.config.contact_strategy,
        );
        let per_chain: BTreeMap<String, f64> = record
            .chains()
            .iter()
            .zip(&counts.per_chain)
            .map(|(chain, &n)| (chain.id.clone(), n as f64))
            .collect();
        set.insert(keys::CONTACTS_PER_CHAIN, MetricValue::PerChain(per_chain));
        set.insert(keys::TOTAL_CONTACTS, MetricValue::Count(counts.total()));
        set.insert(keys::INTER_CHAIN_CONTACTS, MetricValue::Count(counts.inter_chain));
        set.insert(keys::RADIUS_OF_GYRATION, radius_of_gyration(&coords).into());
        set.insert(keys::DISTANCE_MAP, MetricValue::Matrix(distance_matrix(record)));
        set.insert(
            keys::CONTACT_MAP,
            MetricValue::Matrix(contact_map(
                record,
                self.config.contact_cutoff,
                self.config.min_sequence_separation,
            )),
        );

        debug!(residues = record.residue_count(), contacts = counts.total(), "Computed self metrics");
        set
    }

    /// Superpose `model` onto `reference` and score the fit.
    ///
    /// Without a mapping both records must have the same residue count and
    /// are paired index by index.
    pub fn compare(
        &self,
        model: &StructureRecord,
        reference: &StructureRecord,
        mapping: Option<&ResidueMapping>,
    ) -> Result<MetricSet, MetricsError> {
        let (model_len, reference_len) = (model.residue_count(), reference.residue_count());
        let identity;
        let mapping = match mapping {
            Some(mapping) => {
                mapping.check(model_len, reference_len)?;
                mapping
            }
            None if model_len == reference_len => {
                identity = ResidueMapping::identity(model_len);
                &identity
            }
            None => return Err(MetricsError::LengthMismatch { model: model_len, reference: reference_len }),
        };

        let mut set = MetricSet::new();
        set.insert(keys::ALIGNED_RESIDUES, MetricValue::Count(mapping.len() as u64));

        let model_coords = model.representative_coords();
        let reference_coords = reference.representative_coords();
        let mobile: Vec<[f64; 3]> = mapping.pairs.iter().map(|&(m, _)| model_coords[m]).collect();
        let target: Vec<[f64; 3]> = mapping.pairs.iter().map(|&(_, r)| reference_coords[r]).collect();

        let Some(fit) = Superposition::fit(&mobile, &target) else {
            for key in [keys::RMSD, keys::TM_SCORE, keys::GDT_TS] {
                set.insert(key, MetricValue::Undefined);
            }
            return Ok(set);
        };
        let deviations = fit.deviations(&mobile, &target);
        set.insert(keys::RMSD, rmsd(&deviations).into());
        set.insert(keys::TM_SCORE, tm_score(&deviations, reference_len).into());
        set.insert(keys::GDT_TS, gdt_ts(&deviations, reference_len).into());

        debug!(aligned = mapping.len(), rmsd = ?set.scalar(keys::RMSD), "Computed comparative metrics");
        Ok(set)
    }

    /// Self metrics, plus comparative metrics when a reference is given.
    /// An empty record gets every comparative metric `Undefined` instead of
    /// a comparison error.
    pub fn analyze(
        &self,
        record: &StructureRecord,
        reference: Option<&StructureRecord>,
        mapping: Option<&ResidueMapping>,
    ) -> Result<MetricSet, MetricsError> {
        let mut set = self.self_metrics(record);
        match reference {
            Some(_) if record.is_empty() => {
                for key in keys::COMPARATIVE_METRICS {
                    set.insert(key, MetricValue::Undefined);
                }
            }
            Some(reference) => set.extend(self.compare(record, reference, mapping)?),
            None => {}
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proteinstellar_common::{Classify, ErrorKind};
    use proteinstellar_structure::SourceMetadata;

    fn engine() -> MetricsEngine {
        MetricsEngine::new(MetricsConfig::default()).unwrap()
    }

    fn trace(conf: &[f64]) -> StructureRecord {
        let coords: Vec<[f64; 3]> = (0..conf.len()).map(|i| [i as f64 * 3.8, 0.0, 0.0]).collect();
        StructureRecord::from_ca_trace("A", &coords, Some(conf)).unwrap()
    }

    #[test]
    fn test_three_residue_scenario() {
        let set = engine().self_metrics(&trace(&[0.9, 0.4, 0.95]));
        assert_eq!(set.count(keys::LOW_CONFIDENCE_COUNT), Some(1));
        assert!((set.scalar(keys::MEAN_CONFIDENCE).unwrap() - 0.7517).abs() < 0.01);
        assert_eq!(set.count(keys::RESIDUE_COUNT), Some(3));
        assert_eq!(set.count(keys::TOTAL_CONTACTS), Some(3));
    }

    #[test]
    fn test_empty_record_is_undefined() {
        let empty = StructureRecord::empty(SourceMetadata::default());
        let set = engine().self_metrics(&empty);
        assert_eq!(set.len(), keys::SELF_METRICS.len());
        assert!(set.iter().all(|(_, v)| v.is_undefined()));
    }

    #[test]
    fn test_maps_are_square_and_symmetric() {
        let set = engine().self_metrics(&trace(&[0.9, 0.4, 0.95, 0.8]));
        let (Some(MetricValue::Matrix(distances)), Some(MetricValue::Matrix(contacts))) =
            (set.get(keys::DISTANCE_MAP), set.get(keys::CONTACT_MAP))
        else {
            panic!("maps missing: {:?}", set);
        };
        for m in [distances, contacts] {
            assert_eq!((m.rows, m.cols), (4, 4));
            for i in 0..4 {
                for j in 0..4 {
                    assert_eq!(m.get(i, j), m.get(j, i));
                }
            }
        }
        assert!((distances.get(0, 2).unwrap() - 7.6).abs() < 1e-9);
        assert_eq!(contacts.get(0, 2), Some(1.0));
        assert_eq!(contacts.get(0, 3), Some(0.0));
        // contact map agrees with the contact count
        let ones = contacts.values.iter().filter(|&&v| v == 1.0).count() as u64;
        assert_eq!(ones, 2 * set.count(keys::TOTAL_CONTACTS).unwrap());
    }

    #[test]
    fn test_empty_record_against_reference_is_undefined() {
        let empty = StructureRecord::empty(SourceMetadata::default());
        let reference = trace(&[0.9, 0.4, 0.95]);
        let set = engine().analyze(&empty, Some(&reference), None).unwrap();
        assert_eq!(set.len(), keys::SELF_METRICS.len() + keys::COMPARATIVE_METRICS.len());
        assert!(set.iter().all(|(_, v)| v.is_undefined()));
    }

    #[test]
    fn test_single_residue_has_zero_contacts() {
        let set = engine().self_metrics(&trace(&[0.8]));
        assert_eq!(set.count(keys::TOTAL_CONTACTS), Some(0));
        assert_eq!(set.scalar(keys::RADIUS_OF_GYRATION), Some(0.0));
    }

    #[test]
    fn test_low_confidence_is_monotonic_in_threshold() {
        let record = trace(&[0.1, 0.35, 0.5, 0.62, 0.7, 0.88, 0.97]);
        let mut last = 0;
        for t in [0.0, 0.2, 0.35, 0.5, 0.51, 0.9, 1.0] {
            let config = MetricsConfig { confidence_threshold: t, ..Default::default() };
            let n = MetricsEngine::new(config).unwrap().self_metrics(&record).count(keys::LOW_CONFIDENCE_COUNT).unwrap();
            assert!(n >= last, "threshold {} gave {} after {}", t, n, last);
            last = n;
        }
        assert_eq!(last, 7);
    }

    #[test]
    fn test_length_mismatch_without_mapping() {
        let err = engine().compare(&trace(&[0.9, 0.9]), &trace(&[0.9, 0.9, 0.9]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleStructures);
    }

    #[test]
    fn test_mapping_allows_different_lengths() {
        let model = trace(&[0.9, 0.9]);
        let reference = trace(&[0.9, 0.9, 0.9, 0.9]);
        let mapping = ResidueMapping::new(vec![(0, 1), (1, 2)]);
        let set = engine().compare(&model, &reference, Some(&mapping)).unwrap();
        assert_eq!(set.count(keys::ALIGNED_RESIDUES), Some(2));
        assert!(set.scalar(keys::RMSD).unwrap() < 1e-9);
        // two of four reference residues are covered
        assert!((set.scalar(keys::GDT_TS).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_mapping() {
        let model = trace(&[0.9, 0.9]);
        let bad = ResidueMapping::new(vec![(0, 0), (0, 1)]);
        assert!(matches!(engine().compare(&model, &model, Some(&bad)), Err(MetricsError::InvalidMapping(_))));
        let out_of_range = ResidueMapping::new(vec![(5, 0)]);
        assert!(engine().compare(&model, &model, Some(&out_of_range)).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = MetricsConfig { contact_cutoff: -1.0, ..Default::default() };
        assert!(MetricsEngine::new(config).is_err());
    }
}
