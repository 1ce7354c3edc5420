//! One prediction request as an explicit state machine.
//!
//! ```text
//! Pending ──submit──▶ Submitted ──poll──▶ Polling ──▶ Succeeded
//!    ▲                    │                  │   └──▶ Failed
//!    └──── backoff ◀──────┴──── retryable ◀──┘
//! Pending / Submitted / Polling ──cancel──▶ Cancelled
//! ```
//!
//! [`PredictionJob::step`] performs exactly one engine interaction and tells
//! the driver what to do next; [`PredictionJob::drive`] loops over steps with
//! the job deadline, backoff sleeps and cancellation.

use chrono::{DateTime, Utc};
use proteinstellar_common::{Classify, EngineConfig, ErrorKind, Fingerprint, OrchestratorSettings, Sequence};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::backend::{FoldingEngine, JobHandle, PollStatus, StructurePayload};
use crate::error::{EngineError, TerminalReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error seen while running a job, retried or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub attempt: u32,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDiagnostics {
    /// Submission attempts made against the engine
    pub attempts: u32,
    pub polls: u32,
    /// Time spent waiting for a concurrency slot
    pub queue_wait_ms: u64,
    /// Request to final state, queueing included
    pub latency_ms: u64,
    pub final_state: JobState,
    pub errors: Vec<ErrorRecord>,
    /// Served from the orchestrator cache or joined an in-flight job
    pub cache_hit: bool,
}

/// Final, shareable result of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub fingerprint: Fingerprint,
    pub engine: String,
    pub state: JobState,
    pub payload: Option<StructurePayload>,
    pub error: Option<EngineError>,
    pub completed_at: DateTime<Utc>,
    pub diagnostics: JobDiagnostics,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// Outcome for a request cancelled before it ever reached the engine.
    pub fn cancelled_before_start(fingerprint: Fingerprint, engine: &str, waited: Duration) -> Self {
        let waited_ms = millis(waited);
        Self {
            fingerprint,
            engine: engine.to_string(),
            state: JobState::Cancelled,
            payload: None,
            error: Some(EngineError::Cancelled),
            completed_at: Utc::now(),
            diagnostics: JobDiagnostics {
                attempts: 0,
                polls: 0,
                queue_wait_ms: waited_ms,
                latency_ms: waited_ms,
                final_state: JobState::Cancelled,
                errors: vec![ErrorRecord {
                    attempt: 0,
                    kind: ErrorKind::Cancelled,
                    message: EngineError::Cancelled.to_string(),
                }],
                cache_hit: false,
            },
        }
    }
}

/// Driver instruction returned by [`PredictionJob::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Step again immediately
    Continue,
    /// Sleep, then step again
    Wait(Duration),
    /// The job reached a terminal state
    Done,
}

pub struct PredictionJob {
    fingerprint: Fingerprint,
    sequence: Sequence,
    config: EngineConfig,
    settings: OrchestratorSettings,
    state: JobState,
    handle: Option<JobHandle>,
    attempts: u32,
    polls: u32,
    poll_failures: u32,
    attempt_started: Option<Instant>,
    errors: Vec<ErrorRecord>,
    last_error: Option<EngineError>,
    payload: Option<StructurePayload>,
}

impl fmt::Debug for PredictionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionJob")
            .field("fingerprint", &self.fingerprint.short())
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Run one engine call under `limit`; overrunning it is a retryable timeout.
async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::timeout(format!("{} call exceeded {:?}", what, limit))),
    }
}

/// Resolves once cancellation is signalled. Never resolves if the sender is
/// gone without signalling.
pub(crate) async fn cancelled(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

impl PredictionJob {
    pub fn new(sequence: Sequence, config: EngineConfig, settings: OrchestratorSettings) -> Self {
        Self {
            fingerprint: Fingerprint::of(&sequence, &config),
            sequence,
            config,
            settings,
            state: JobState::Pending,
            handle: None,
            attempts: 0,
            polls: 0,
            poll_failures: 0,
            attempt_started: None,
            errors: Vec::new(),
            last_error: None,
            payload: None,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn handle(&self) -> Option<&JobHandle> {
        self.handle.as_ref()
    }

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// The retrieved structure. Repeated calls return the same payload and
    /// never contact the engine.
    pub fn result(&self) -> Option<&StructurePayload> {
        self.payload.as_ref()
    }

    fn record(&mut self, err: &EngineError) {
        self.errors.push(ErrorRecord { attempt: self.attempts, kind: err.kind(), message: err.to_string() });
    }

    /// Advance by one engine interaction.
    pub async fn step(&mut self, engine: &dyn FoldingEngine) -> Next {
        match self.state {
            JobState::Pending => {
                self.attempts += 1;
                self.poll_failures = 0;
                debug!(fingerprint = %self.fingerprint.short(), attempt = self.attempts, "Submitting job");
                let call_timeout = self.settings.call_timeout();
                match bounded(call_timeout, "submit", engine.submit(&self.sequence, &self.config)).await {
                    Ok(handle) => {
                        debug!(fingerprint = %self.fingerprint.short(), job = %handle, "Job accepted");
                        self.handle = Some(handle);
                        self.attempt_started = Some(Instant::now());
                        self.state = JobState::Submitted;
                        Next::Continue
                    }
                    Err(err) => self.fail_attempt(err),
                }
            }
            JobState::Submitted | JobState::Polling => {
                let attempt_timeout = self.settings.attempt_timeout();
                if self.attempt_started.map_or(false, |t| t.elapsed() >= attempt_timeout) {
                    self.release_handle(engine).await;
                    return self.fail_attempt(EngineError::timeout(format!(
                        "attempt {} exceeded {:?}",
                        self.attempts, attempt_timeout
                    )));
                }
                let Some(handle) = self.handle.clone() else {
                    return self.fail_attempt(EngineError::terminal(TerminalReason::Other, "job has no engine handle"));
                };

                self.polls += 1;
                self.state = JobState::Polling;
                match bounded(self.settings.call_timeout(), "poll", engine.poll(&handle)).await {
                    Ok(PollStatus::Pending) | Ok(PollStatus::Running) => {
                        self.poll_failures = 0;
                        Next::Wait(self.settings.poll_interval())
                    }
                    Ok(PollStatus::Succeeded(payload)) => {
                        info!(
                            fingerprint = %self.fingerprint.short(),
                            attempts = self.attempts,
                            bytes = payload.len(),
                            "Job succeeded"
                        );
                        self.payload = Some(payload);
                        self.handle = None;
                        self.state = JobState::Succeeded;
                        Next::Done
                    }
                    Ok(PollStatus::Failed(err)) => self.fail_attempt(err),
                    Err(err) if err.is_retryable() => {
                        self.poll_failures += 1;
                        if self.poll_failures > self.settings.max_retries {
                            self.release_handle(engine).await;
                            return self.fail_attempt(err);
                        }
                        debug!(fingerprint = %self.fingerprint.short(), error = %err, "Poll failed, will poll again");
                        self.record(&err);
                        Next::Wait(self.settings.poll_interval())
                    }
                    Err(err) => self.fail_attempt(err),
                }
            }
            JobState::Succeeded | JobState::Failed | JobState::Cancelled => Next::Done,
        }
    }

    fn fail_attempt(&mut self, err: EngineError) -> Next {
        self.handle = None;
        self.attempt_started = None;
        self.record(&err);

        if err.is_retryable() && self.attempts < self.settings.max_retries {
            let delay = self.settings.backoff(self.attempts);
            warn!(
                fingerprint = %self.fingerprint.short(),
                attempt = self.attempts,
                error = %err,
                delay_ms = millis(delay),
                "Attempt failed, retrying"
            );
            self.state = JobState::Pending;
            return Next::Wait(delay);
        }

        self.state = if err == EngineError::Cancelled { JobState::Cancelled } else { JobState::Failed };
        warn!(fingerprint = %self.fingerprint.short(), attempts = self.attempts, error = %err, "Job failed");
        self.last_error = Some(err);
        Next::Done
    }

    /// Best-effort engine-side cancel of the current handle.
    async fn release_handle(&mut self, engine: &dyn FoldingEngine) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = bounded(self.settings.call_timeout(), "cancel", engine.cancel(&handle)).await {
                debug!(job = %handle, error = %err, "Engine cancel failed");
            }
        }
    }

    /// Stop the job. Already-finished jobs are left as they are.
    pub async fn cancel(&mut self, engine: &dyn FoldingEngine) {
        if self.state.is_terminal() {
            return;
        }
        self.release_handle(engine).await;
        let err = EngineError::Cancelled;
        self.record(&err);
        self.last_error = Some(err);
        self.state = JobState::Cancelled;
        info!(fingerprint = %self.fingerprint.short(), "Job cancelled");
    }

    /// Fail the job because its overall deadline passed.
    async fn expire(&mut self, engine: &dyn FoldingEngine) {
        if self.state.is_terminal() {
            return;
        }
        self.release_handle(engine).await;
        let err = EngineError::timeout(format!("job exceeded {:?}", self.settings.job_timeout()));
        warn!(fingerprint = %self.fingerprint.short(), attempts = self.attempts, "Job deadline exceeded");
        self.record(&err);
        self.last_error = Some(err);
        self.state = JobState::Failed;
    }

    /// Step until a terminal state, honouring the job deadline and `cancel`.
    #[instrument(skip_all, fields(fingerprint = %self.fingerprint.short()))]
    pub async fn drive(&mut self, engine: &dyn FoldingEngine, mut cancel: watch::Receiver<bool>) {
        let deadline = Instant::now() + self.settings.job_timeout();

        loop {
            if *cancel.borrow() {
                self.cancel(engine).await;
                return;
            }

            let next = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => None,
                step = tokio::time::timeout_at(deadline, self.step(engine)) => Some(step),
            };

            match next {
                None => {
                    self.cancel(engine).await;
                    return;
                }
                Some(Err(_)) => {
                    self.expire(engine).await;
                    return;
                }
                Some(Ok(Next::Done)) => return,
                Some(Ok(Next::Continue)) => {}
                Some(Ok(Next::Wait(delay))) => {
                    let wake = std::cmp::min(Instant::now() + delay, deadline);
                    let interrupted = tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => true,
                        _ = tokio::time::sleep_until(wake) => false,
                    };
                    if interrupted {
                        self.cancel(engine).await;
                        return;
                    }
                    if Instant::now() >= deadline {
                        self.expire(engine).await;
                        return;
                    }
                }
            }
        }
    }

    /// Freeze the job into its shareable outcome.
    pub fn into_outcome(self, engine: &str, queue_wait: Duration, latency: Duration) -> JobOutcome {
        JobOutcome {
            fingerprint: self.fingerprint,
            engine: engine.to_string(),
            state: self.state,
            payload: self.payload,
            error: self.last_error,
            completed_at: Utc::now(),
            diagnostics: JobDiagnostics {
                attempts: self.attempts,
                polls: self.polls,
                queue_wait_ms: millis(queue_wait),
                latency_ms: millis(latency),
                final_state: self.state,
                errors: self.errors,
                cache_hit: false,
            },
        }
    }
}
