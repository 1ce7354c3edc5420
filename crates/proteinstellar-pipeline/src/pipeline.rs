//! End-to-end analysis: fold each sequence, parse the returned structure,
//! compute metrics, and fold everything into one report.
//!
//! Stages per item:
//!   1. Validate the sequence (invalid input fails only that item)
//!   2. Run or reuse the prediction job through the orchestrator
//!   3. Parse the payload and compute metrics on a blocking worker
//!   4. Attach engine provenance and emit the bundle
//!
//! Only invalid options abort a run, and they do so before any job is
//! submitted.

use futures_util::future::join_all;
use proteinstellar_common::{Classify, ErrorKind, PipelineConfig, Result, Sequence, SequenceInput};
use proteinstellar_engine::{engine_from_config, FoldingEngine, JobDiagnostics, JobOrchestrator, JobOutcome};
use proteinstellar_metrics::{MetricSet, MetricsEngine, ResidueMapping};
use proteinstellar_structure::{ParserOptions, StructureParser, StructureRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::options::AnalysisOptions;
use crate::report::{BatchReport, ItemFailure, ItemOutcome, ResultBundle};

// ── Progress events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Predicted,
    Analyzed,
    Failed,
}

/// Progress event emitted during a run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    pub run_id: Uuid,
    pub index: usize,
    pub id: String,
    pub stage: Stage,
    pub message: String,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

enum Jobs {
    /// A fresh orchestrator per run, shut down when the run ends
    PerRun(Arc<dyn FoldingEngine>),
    /// A long-lived orchestrator whose cache outlives single runs
    Session(Arc<JobOrchestrator>),
}

pub struct AnalysisPipeline {
    jobs: Jobs,
    progress: Option<broadcast::Sender<PipelineEvent>>,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let jobs = match &self.jobs {
            Jobs::PerRun(engine) => format!("per-run({})", engine.name()),
            Jobs::Session(orchestrator) => format!("session({})", orchestrator.engine_name()),
        };
        f.debug_struct("AnalysisPipeline").field("jobs", &jobs).finish()
    }
}

struct RunContext<'a> {
    run_id: Uuid,
    options: &'a AnalysisOptions,
    orchestrator: &'a JobOrchestrator,
    metrics: MetricsEngine,
}

impl AnalysisPipeline {
    /// Pipeline that builds an orchestrator per run from the run's options.
    pub fn new(engine: Arc<dyn FoldingEngine>) -> Self {
        Self { jobs: Jobs::PerRun(engine), progress: None }
    }

    /// Pipeline sharing a caller-owned orchestrator across runs. Its own
    /// concurrency, retry and timeout settings apply instead of the
    /// per-call options.
    pub fn with_orchestrator(orchestrator: Arc<JobOrchestrator>) -> Self {
        Self { jobs: Jobs::Session(orchestrator), progress: None }
    }

    /// Pipeline for the engine selected by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(engine_from_config(config)?))
    }

    pub fn with_progress(mut self, progress: broadcast::Sender<PipelineEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Analyze a batch. The report holds exactly one outcome per input, in
    /// input order.
    #[instrument(skip_all, fields(items = inputs.len()))]
    pub async fn run(&self, inputs: Vec<SequenceInput>, options: &AnalysisOptions) -> Result<BatchReport> {
        let started = Instant::now();
        options.validate()?;
        let metrics = MetricsEngine::new(options.analysis_settings())?;

        let (orchestrator, per_run) = match &self.jobs {
            Jobs::PerRun(engine) => {
                (Arc::new(JobOrchestrator::new(engine.clone(), options.orchestrator_settings())?), true)
            }
            Jobs::Session(orchestrator) => {
                if orchestrator.settings() != &options.orchestrator_settings() {
                    warn!(
                        session = ?orchestrator.settings(),
                        "Session orchestrator settings override per-call job options"
                    );
                }
                (orchestrator.clone(), false)
            }
        };

        let run_id = Uuid::new_v4();
        info!(%run_id, engine = orchestrator.engine_name(), items = inputs.len(), "Starting analysis run");

        let ctx = RunContext { run_id, options, orchestrator: &orchestrator, metrics };
        let items = join_all(
            inputs.into_iter().enumerate().map(|(index, input)| self.process(&ctx, index, input)),
        )
        .await;

        if per_run {
            orchestrator.shutdown();
        }

        let report = BatchReport {
            run_id,
            engine: orchestrator.engine_name().to_string(),
            items,
            duration_ms: millis(started.elapsed()),
        };
        info!(
            %run_id,
            succeeded = report.success_count(),
            failed = report.failure_count(),
            duration_ms = report.duration_ms,
            "Analysis run finished"
        );
        Ok(report)
    }

    async fn process(&self, ctx: &RunContext<'_>, index: usize, input: SequenceInput) -> ItemOutcome {
        let sequence = match Sequence::new(&input.residues) {
            Ok(sequence) => sequence,
            Err(e) => return self.fail(ctx, index, input, failure(&e, None)),
        };

        let job = ctx.orchestrator.submit(sequence.clone(), &ctx.options.engine_config).await;
        let diagnostics = job.diagnostics();
        if !job.outcome.is_success() {
            let failure = match &job.outcome.error {
                Some(e) => failure(e, Some(diagnostics)),
                None => ItemFailure {
                    kind: ErrorKind::TerminalEngine,
                    message: format!("job ended {} without an error", job.outcome.state),
                    diagnostics: Some(diagnostics),
                },
            };
            return self.fail(ctx, index, input, failure);
        }
        self.emit(ctx, index, &input.id, Stage::Predicted, format!("{} attempt(s)", diagnostics.attempts));

        let outcome = job.outcome.clone();
        let parser_options = ctx.options.parser_options();
        let metrics = ctx.metrics.clone();
        let reference = ctx.options.reference_structure.clone();
        let mapping = ctx.options.reference_mapping.clone();
        let analyzed = tokio::task::spawn_blocking(move || {
            analyze(&outcome, parser_options, &metrics, reference.as_deref(), mapping.as_ref())
        })
        .await;

        let (structure, metrics) = match analyzed {
            Ok(Ok(done)) => done,
            Ok(Err((kind, message))) => {
                return self.fail(ctx, index, input, ItemFailure { kind, message, diagnostics: Some(diagnostics) });
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                let failure = ItemFailure {
                    kind: ErrorKind::Cancelled,
                    message: format!("analysis task did not finish: {}", e),
                    diagnostics: Some(diagnostics),
                };
                return self.fail(ctx, index, input, failure);
            }
        };

        self.emit(ctx, index, &input.id, Stage::Analyzed, format!("{} residue(s)", structure.residue_count()));
        ItemOutcome::Succeeded(Box::new(ResultBundle {
            id: input.id,
            sequence: sequence.into(),
            fingerprint: job.outcome.fingerprint.clone(),
            structure,
            metrics,
            diagnostics,
        }))
    }

    fn fail(&self, ctx: &RunContext<'_>, index: usize, input: SequenceInput, failure: ItemFailure) -> ItemOutcome {
        warn!(run_id = %ctx.run_id, index, id = %input.id, kind = %failure.kind, "Item failed: {}", failure.message);
        self.emit(ctx, index, &input.id, Stage::Failed, failure.message.clone());
        ItemOutcome::Failed { id: input.id, sequence: input.residues, failure }
    }

    fn emit(&self, ctx: &RunContext<'_>, index: usize, id: &str, stage: Stage, message: String) {
        if let Some(tx) = &self.progress {
            // nobody listening is fine
            let _ = tx.send(PipelineEvent { run_id: ctx.run_id, index, id: id.to_string(), stage, message });
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn failure<E: Classify + std::fmt::Display>(err: &E, diagnostics: Option<JobDiagnostics>) -> ItemFailure {
    ItemFailure { kind: err.kind(), message: err.to_string(), diagnostics }
}

/// Parse and measure one payload. Runs on a blocking worker.
fn analyze(
    outcome: &JobOutcome,
    parser_options: ParserOptions,
    metrics: &MetricsEngine,
    reference: Option<&StructureRecord>,
    mapping: Option<&ResidueMapping>,
) -> std::result::Result<(StructureRecord, MetricSet), (ErrorKind, String)> {
    let payload = outcome
        .payload
        .as_ref()
        .ok_or_else(|| (ErrorKind::TerminalEngine, "succeeded job carries no payload".to_string()))?;

    let record = StructureParser::new()
        .with_options(parser_options)
        .parse_bytes(&payload.bytes)
        .map_err(|e| (e.kind(), e.to_string()))?
        .with_provenance(outcome.engine.clone(), outcome.completed_at);

    let set = metrics.analyze(&record, reference, mapping).map_err(|e| (e.kind(), e.to_string()))?;
    Ok((record, set))
}
