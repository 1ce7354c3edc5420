use pretty_assertions::assert_eq;
use proteinstellar_common::{parse_fasta, ErrorKind, OrchestratorSettings, SequenceInput, StellarError};
use proteinstellar_engine::JobOrchestrator;
use proteinstellar_metrics::keys;
use proteinstellar_pipeline::{AnalysisOptions, AnalysisPipeline, JobTimeouts, Stage};
use proteinstellar_structure::parse;
use proteinstellar_test_utils::{FakeEngine, Script, SyntheticStructure};
use std::sync::Arc;
use std::time::Duration;

fn three_residues() -> String {
    SyntheticStructure::straight_chain("A", &[90.0, 40.0, 95.0]).to_pdb()
}

fn fast() -> JobTimeouts {
    JobTimeouts {
        poll_interval_ms: 5,
        backoff_base_ms: 1,
        backoff_max_ms: 5,
        call_timeout_ms: 1_000,
        attempt_timeout_ms: 5_000,
        job_timeout_ms: 10_000,
    }
}

fn options() -> AnalysisOptions {
    AnalysisOptions { timeouts: fast(), ..Default::default() }
}

fn pipeline(engine: &Arc<FakeEngine>) -> AnalysisPipeline {
    AnalysisPipeline::new(engine.clone())
}

#[tokio::test]
async fn test_three_residue_scenario() -> anyhow::Result<()> {
    proteinstellar_common::telemetry::init_tracing("warn");
    let engine = Arc::new(FakeEngine::new(Script::succeed(three_residues())));
    let report = pipeline(&engine).run(SequenceInput::from_strings(["MKT"]), &options()).await?;

    assert_eq!(report.len(), 1);
    let bundle = report.items[0].bundle().expect("item should succeed");
    assert_eq!(bundle.id, "seq_1");
    assert_eq!(bundle.sequence, "MKT");
    assert_eq!(bundle.metrics.count(keys::LOW_CONFIDENCE_COUNT), Some(1));
    // exact mean is 0.75
    assert!((bundle.metrics.scalar(keys::MEAN_CONFIDENCE).unwrap() - 0.7517).abs() < 0.01);
    assert_eq!(bundle.structure.residue_count(), 3);
    assert_eq!(bundle.structure.source().engine.as_deref(), Some("fake"));
    assert!(bundle.structure.source().completed_at.is_some());
    assert_eq!(bundle.diagnostics.attempts, 1);
    assert!(bundle.metrics.get(keys::RMSD).is_none());
    Ok(())
}

#[tokio::test]
async fn test_malformed_structure_fails_only_its_item() -> anyhow::Result<()> {
    let malformed = three_residues().replacen("   0.000", "  garble", 1);
    let engine = Arc::new(
        FakeEngine::new(Script::succeed(three_residues())).with_script("MKV", Script::succeed(malformed)),
    );
    let inputs = SequenceInput::from_strings(["MKT", "MKA", "MKV", "MKL"]);

    let report = pipeline(&engine).run(inputs, &options()).await?;

    assert_eq!(report.len(), 4);
    assert_eq!(report.success_count(), 3);
    let failures = report.failure_report();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 2);
    assert_eq!(failures[0].id, "seq_3");
    assert_eq!(failures[0].kind, ErrorKind::MalformedStructure);
    Ok(())
}

#[tokio::test]
async fn test_invalid_sequence_is_reported_without_submission() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed(three_residues())));
    let inputs = vec![SequenceInput::new("good", "MKT"), SequenceInput::new("bad", "MK1T"), SequenceInput::new("empty", "")];

    let report = pipeline(&engine).run(inputs, &options()).await?;

    let kinds: Vec<_> = report.failure_report().into_iter().map(|f| (f.id, f.kind)).collect();
    assert_eq!(
        kinds,
        vec![("bad".to_string(), ErrorKind::InvalidSequence), ("empty".to_string(), ErrorKind::InvalidSequence)]
    );
    assert_eq!(engine.submissions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_timeout_on_every_attempt() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::HangOnSubmit));
    let options = AnalysisOptions { timeouts: JobTimeouts { call_timeout_ms: 20, ..fast() }, max_retries: 3, ..options() };

    let report = pipeline(&engine).run(SequenceInput::from_strings(["MKT"]), &options).await?;

    let failure = report.items[0].failure().expect("item should fail");
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.diagnostics.as_ref().map(|d| d.attempts), Some(3));
    assert_eq!(engine.submissions(), 3);
    Ok(())
}

#[tokio::test]
async fn test_invalid_options_abort_before_submission() {
    let engine = Arc::new(FakeEngine::new(Script::succeed(three_residues())));
    let bad = AnalysisOptions { confidence_threshold: 1.5, ..options() };

    let err = pipeline(&engine).run(SequenceInput::from_strings(["MKT", "MKA"]), &bad).await.unwrap_err();

    assert!(matches!(err, StellarError::Config(_)));
    assert_eq!(engine.submissions(), 0);
}

#[tokio::test]
async fn test_duplicate_sequences_share_one_job() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed_after(three_residues(), Duration::from_millis(30))));
    let report = pipeline(&engine).run(SequenceInput::from_strings(["MKT", "MKT", "MKA"]), &options()).await?;

    assert_eq!(report.success_count(), 3);
    assert_eq!(engine.submissions(), 2);
    let hits = report.succeeded().filter(|b| b.diagnostics.cache_hit).count();
    assert_eq!(hits, 1);
    Ok(())
}

#[tokio::test]
async fn test_output_follows_input_order() -> anyhow::Result<()> {
    let engine = Arc::new(
        FakeEngine::new(Script::succeed(three_residues()))
            .with_script("MKA", Script::succeed_after(three_residues(), Duration::from_millis(60))),
    );
    let inputs = vec![
        SequenceInput::new("slow", "MKA"),
        SequenceInput::new("fast", "MKT"),
        SequenceInput::new("broken", "MK?"),
        SequenceInput::new("last", "MKL"),
    ];

    let report = pipeline(&engine).run(inputs, &options()).await?;

    let ids: Vec<&str> = report.items.iter().map(|i| i.id()).collect();
    assert_eq!(ids, vec!["slow", "fast", "broken", "last"]);
    Ok(())
}

#[tokio::test]
async fn test_reference_enables_comparative_metrics() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed(three_residues())));
    let reference = parse(&three_residues())?;
    let options = options().with_reference(reference);

    let report = pipeline(&engine).run(SequenceInput::from_strings(["MKT"]), &options).await?;

    let bundle = report.items[0].bundle().expect("item should succeed");
    assert!(bundle.metrics.scalar(keys::RMSD).unwrap() < 1e-9);
    assert_eq!(bundle.metrics.count(keys::ALIGNED_RESIDUES), Some(3));
    assert!((bundle.metrics.scalar(keys::TM_SCORE).unwrap() - 1.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_incompatible_reference_fails_the_item() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed(three_residues())));
    let longer = parse(&SyntheticStructure::straight_chain("A", &[80.0; 5]).to_pdb())?;
    let options = options().with_reference(longer);

    let report = pipeline(&engine).run(SequenceInput::from_strings(["MKT"]), &options).await?;

    assert_eq!(report.failure_report()[0].kind, ErrorKind::IncompatibleStructures);
    Ok(())
}

#[tokio::test]
async fn test_empty_structure_has_undefined_metrics() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed("END\n")));
    let report = pipeline(&engine).run(SequenceInput::from_strings(["MKT"]), &options()).await?;

    let bundle = report.items[0].bundle().expect("empty structure is still a result");
    assert_eq!(bundle.structure.residue_count(), 0);
    assert!(bundle.metrics.iter().all(|(_, v)| v.is_undefined()));
    Ok(())
}

#[tokio::test]
async fn test_empty_structure_with_reference_is_still_a_result() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed("END\n")));
    let options = options().with_reference(parse(&three_residues())?);

    let report = pipeline(&engine).run(SequenceInput::from_strings(["MKT"]), &options).await?;

    let bundle = report.items[0].bundle().expect("empty structure is still a result");
    for key in keys::COMPARATIVE_METRICS {
        assert!(bundle.metrics.get(key).is_some_and(|v| v.is_undefined()), "{} should be undefined", key);
    }
    assert!(bundle.metrics.iter().all(|(_, v)| v.is_undefined()));
    Ok(())
}

#[tokio::test]
async fn test_session_orchestrator_reuses_results_across_runs() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed(three_residues())));
    let settings = OrchestratorSettings { poll_interval_ms: 5, backoff_base_ms: 1, ..Default::default() };
    let orchestrator = Arc::new(JobOrchestrator::new(engine.clone(), settings)?);
    let pipeline = AnalysisPipeline::with_orchestrator(orchestrator.clone());
    // per-call job options differ, so the run warns and keeps the session settings
    assert_ne!(orchestrator.settings(), &options().orchestrator_settings());

    pipeline.run(SequenceInput::from_strings(["MKT"]), &options()).await?;
    let second = pipeline.run(SequenceInput::from_strings(["MKT"]), &options()).await?;

    assert_eq!(engine.submissions(), 1);
    assert!(second.items[0].bundle().unwrap().diagnostics.cache_hit);
    assert_eq!(orchestrator.stats().cached, 1);
    assert_eq!(orchestrator.settings().max_concurrent_jobs, OrchestratorSettings::default().max_concurrent_jobs);
    Ok(())
}

#[tokio::test]
async fn test_progress_events_are_broadcast() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed(three_residues())));
    let (tx, mut rx) = tokio::sync::broadcast::channel(16);
    let pipeline = AnalysisPipeline::new(engine.clone()).with_progress(tx);

    let report = pipeline.run(SequenceInput::from_strings(["MKT", "MK!"]), &options()).await?;

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.run_id, report.run_id);
        stages.push((event.index, event.stage));
    }
    stages.sort_by_key(|(index, _)| *index);
    assert!(stages.contains(&(0, Stage::Predicted)));
    assert!(stages.contains(&(0, Stage::Analyzed)));
    assert!(stages.contains(&(1, Stage::Failed)));
    Ok(())
}

#[tokio::test]
async fn test_fasta_records_keep_their_ids() -> anyhow::Result<()> {
    let engine = Arc::new(FakeEngine::new(Script::succeed(three_residues())));
    let inputs = parse_fasta(">query_1 first\nMKT\nAY\n>query_2\nmka\n")?;

    let report = pipeline(&engine).run(inputs, &options()).await?;

    let sequences: Vec<(&str, &str)> = report.succeeded().map(|b| (b.id.as_str(), b.sequence.as_str())).collect();
    assert_eq!(sequences, vec![("query_1", "MKTAY"), ("query_2", "MKA")]);
    Ok(())
}
