use pretty_assertions::assert_eq;
use proteinstellar_common::ContactStrategy;
use proteinstellar_metrics::{keys, MetricsConfig, MetricsEngine, MetricValue};
use proteinstellar_structure::{parse, StructureRecord};
use proteinstellar_test_utils::SyntheticStructure;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_record(seed: u64, chains: usize, residues: usize) -> StructureRecord {
    parse(&SyntheticStructure::random(&mut StdRng::seed_from_u64(seed), chains, residues).to_pdb()).unwrap()
}

/// Same residues with every CA displaced by up to `noise` Å.
fn perturbed(record: &StructureRecord, seed: u64, noise: f64) -> StructureRecord {
    let mut rng = StdRng::seed_from_u64(seed);
    let coords: Vec<[f64; 3]> = record
        .representative_coords()
        .iter()
        .map(|p| [p[0] + rng.gen_range(-noise..noise), p[1] + rng.gen_range(-noise..noise), p[2]])
        .collect();
    StructureRecord::from_ca_trace("A", &coords, None).unwrap()
}

#[test]
fn test_parsed_structure_against_itself() {
    let record = random_record(1, 2, 60);
    let engine = MetricsEngine::new(MetricsConfig::default()).unwrap();
    let set = engine.analyze(&record, Some(&record), None).unwrap();

    assert!(set.scalar(keys::RMSD).unwrap() < 1e-9);
    assert!((set.scalar(keys::TM_SCORE).unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(set.scalar(keys::GDT_TS), Some(1.0));
    assert_eq!(set.count(keys::ALIGNED_RESIDUES), Some(120));
    assert_eq!(set.count(keys::CHAIN_COUNT), Some(2));
    match set.get(keys::CONTACTS_PER_CHAIN) {
        Some(MetricValue::PerChain(per_chain)) => {
            assert_eq!(per_chain.keys().cloned().collect::<Vec<_>>(), vec!["A".to_string(), "B".to_string()]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_rmsd_is_symmetric_on_parsed_structures() {
    let engine = MetricsEngine::new(MetricsConfig::default()).unwrap();
    let a = random_record(2, 1, 80);
    let b = perturbed(&a, 3, 1.5);
    let ab = engine.compare(&a, &b, None).unwrap().scalar(keys::RMSD).unwrap();
    let ba = engine.compare(&b, &a, None).unwrap().scalar(keys::RMSD).unwrap();
    assert!(ab > 0.0);
    assert!((ab - ba).abs() < 1e-9);
}

#[test]
fn test_contact_strategies_agree_on_large_input() {
    // large enough that Auto picks the grid
    let record = random_record(4, 2, 800);
    let count = |strategy| {
        let config = MetricsConfig { contact_strategy: strategy, min_sequence_separation: 3, ..Default::default() };
        let set = MetricsEngine::new(config).unwrap().self_metrics(&record);
        (set.count(keys::TOTAL_CONTACTS).unwrap(), set.count(keys::INTER_CHAIN_CONTACTS).unwrap())
    };
    let all_pairs = count(ContactStrategy::AllPairs);
    assert!(all_pairs.0 > 0);
    assert_eq!(count(ContactStrategy::Grid), all_pairs);
    assert_eq!(count(ContactStrategy::Auto), all_pairs);
}
