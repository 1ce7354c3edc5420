use pretty_assertions::assert_eq;
use proteinstellar_structure::{parse, ConfidenceScale, ParserOptions, StructureParser};
use proteinstellar_test_utils::SyntheticStructure;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn atom_coords(text: &str) -> Vec<[f64; 3]> {
    let record = parse(text).unwrap();
    record.residues().flat_map(|r| r.atoms.iter().map(|a| a.coord)).collect()
}

fn assert_close(actual: &[[f64; 3]], expected: &[[f64; 3]]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        for k in 0..3 {
            assert!((a[k] - e[k]).abs() < 1e-6, "{:?} != {:?}", a, e);
        }
    }
}

#[test]
fn test_parsing_is_deterministic() {
    let text = SyntheticStructure::random(&mut StdRng::seed_from_u64(11), 2, 30).to_pdb();
    let first = parse(&text).unwrap();
    let second = parse(&text).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.source().checksum, second.source().checksum);
}

#[test]
fn test_pdb_recovers_generated_structure() {
    for seed in 0..5 {
        let synthetic = SyntheticStructure::random(&mut StdRng::seed_from_u64(seed), 3, 25);
        let record = parse(&synthetic.to_pdb()).unwrap();

        assert_eq!(record.source().dialect, "pdb");
        assert_eq!(record.chains().len(), 3);
        assert_eq!(record.residue_count(), synthetic.residue_count());
        assert_eq!(record.atom_count(), synthetic.atom_count());
        for (chain, expected) in record.chains().iter().zip(&synthetic.chains) {
            assert_eq!(chain.id, expected.id);
            assert_eq!(chain.residues.len(), expected.residues.len());
        }
        assert_close(&atom_coords(&synthetic.to_pdb()), &synthetic.coords());
    }
}

#[test]
fn test_mmcif_recovers_generated_structure() {
    let synthetic = SyntheticStructure::random(&mut StdRng::seed_from_u64(99), 2, 40);
    let record = parse(&synthetic.to_mmcif()).unwrap();

    assert_eq!(record.source().dialect, "mmcif");
    assert_eq!(record.residue_count(), 80);
    assert_eq!(record.atom_count(), 240);
    assert_close(&atom_coords(&synthetic.to_mmcif()), &synthetic.coords());
}

#[test]
fn test_both_dialects_agree() {
    let synthetic = SyntheticStructure::random(&mut StdRng::seed_from_u64(5), 2, 12);
    let from_pdb = parse(&synthetic.to_pdb()).unwrap();
    let from_cif = parse(&synthetic.to_mmcif()).unwrap();
    assert_eq!(from_pdb.sequence(), from_cif.sequence());
    assert_eq!(from_pdb.confidence(), from_cif.confidence());
    assert_eq!(from_pdb.representative_coords(), from_cif.representative_coords());
}

#[test]
fn test_percent_b_factors_are_normalized() {
    let synthetic = SyntheticStructure::straight_chain("A", &[90.0, 40.0, 95.0]);
    let record = parse(&synthetic.to_pdb()).unwrap();
    let conf: Vec<f64> = record.confidence().iter().map(|c| c.unwrap()).collect();
    assert!((conf[0] - 0.9).abs() < 1e-12);
    assert!((conf[1] - 0.4).abs() < 1e-12);
    assert!((conf[2] - 0.95).abs() < 1e-12);

    let fraction = StructureParser::new()
        .with_options(ParserOptions { confidence_scale: ConfidenceScale::Fraction })
        .parse(&synthetic.to_pdb())
        .unwrap();
    // 90.0 read as a fraction is out of range and clamped with a warning
    assert_eq!(fraction.confidence()[0], Some(1.0));
    assert!(!fraction.warnings().is_empty());
}
