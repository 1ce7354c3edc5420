//! Runs prediction jobs against one engine with bounded concurrency and a
//! fingerprint-keyed result cache.
//!
//! The cache is owned by the orchestrator instance; create one per pipeline
//! run or per long-lived session and tear it down with
//! [`JobOrchestrator::shutdown`]. At most one job per fingerprint is ever in
//! flight: concurrent identical requests wait on the same cell and share its
//! outcome.

use futures_util::future::join_all;
use proteinstellar_common::{EngineConfig, Fingerprint, OrchestratorSettings, Sequence, StellarError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, OnceCell, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backend::FoldingEngine;
use crate::job::{cancelled, JobDiagnostics, JobOutcome, PredictionJob};

type Slot = Arc<OnceCell<Arc<JobOutcome>>>;

/// A request's outcome plus whether this caller triggered the engine work.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub outcome: Arc<JobOutcome>,
    /// The outcome came from the cache or from another caller's in-flight job
    pub cache_hit: bool,
}

impl JobResult {
    /// Diagnostics as seen by this caller.
    pub fn diagnostics(&self) -> JobDiagnostics {
        let mut diagnostics = self.outcome.diagnostics.clone();
        diagnostics.cache_hit = self.cache_hit;
        diagnostics
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    /// Jobs actually driven against the engine (cache hits excluded)
    pub jobs_started: u64,
    pub active: usize,
    pub peak_active: usize,
    pub cached: usize,
}

/// Decrements the active-job counter however the job future ends.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct JobOrchestrator {
    engine: Arc<dyn FoldingEngine>,
    settings: OrchestratorSettings,
    /// Fair semaphore: waiters are admitted in arrival order
    slots: Semaphore,
    cache: Mutex<HashMap<Fingerprint, Slot>>,
    cancel: watch::Sender<bool>,
    jobs_started: AtomicU64,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("engine", &self.engine.name())
            .field("settings", &self.settings)
            .field("stats", &self.stats())
            .finish()
    }
}

impl JobOrchestrator {
    pub fn new(engine: Arc<dyn FoldingEngine>, settings: OrchestratorSettings) -> Result<Self, StellarError> {
        settings.validate()?;
        info!(
            engine = engine.name(),
            max_concurrent_jobs = settings.max_concurrent_jobs,
            max_retries = settings.max_retries,
            "Creating job orchestrator"
        );
        let (cancel, _) = watch::channel(false);
        Ok(Self {
            slots: Semaphore::new(settings.max_concurrent_jobs),
            engine,
            settings,
            cache: Mutex::new(HashMap::new()),
            cancel,
            jobs_started: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        })
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<Fingerprint, Slot>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run (or reuse) the job for one sequence.
    pub async fn submit(&self, sequence: Sequence, config: &EngineConfig) -> JobResult {
        let fingerprint = Fingerprint::of(&sequence, config);
        let requested = Instant::now();
        let slot = self.cache().entry(fingerprint.clone()).or_default().clone();

        let mut ran = false;
        let outcome = slot
            .get_or_init(|| {
                ran = true;
                self.execute(sequence, config.clone(), requested)
            })
            .await
            .clone();

        if !ran {
            debug!(fingerprint = %fingerprint.short(), state = %outcome.state, "Reused job outcome");
        }
        if !outcome.is_success() {
            // failures are reported but not remembered, so a later request retries
            let mut cache = self.cache();
            if cache.get(&fingerprint).map_or(false, |s| Arc::ptr_eq(s, &slot)) {
                cache.remove(&fingerprint);
            }
        }

        JobResult { outcome, cache_hit: !ran }
    }

    /// Run a batch. The output is in input order, whatever order jobs finish in.
    pub async fn run_batch(&self, requests: Vec<(Sequence, EngineConfig)>) -> Vec<JobResult> {
        info!(count = requests.len(), "Running job batch");
        join_all(requests.into_iter().map(|(sequence, config)| async move {
            self.submit(sequence, &config).await
        }))
        .await
    }

    async fn execute(&self, sequence: Sequence, config: EngineConfig, requested: Instant) -> Arc<JobOutcome> {
        let mut cancel = self.cancel.subscribe();
        let permit = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => None,
            permit = self.slots.acquire() => permit.ok(),
        };

        let mut job = PredictionJob::new(sequence, config, self.settings.clone());
        let Some(_permit) = permit else {
            info!(fingerprint = %job.fingerprint().short(), "Job cancelled while queued");
            return Arc::new(JobOutcome::cancelled_before_start(
                job.fingerprint().clone(),
                self.engine.name(),
                requested.elapsed(),
            ));
        };

        let queue_wait = requested.elapsed();
        self.jobs_started.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard(&self.active);
        self.peak_active.fetch_max(now_active, Ordering::SeqCst);
        debug!(fingerprint = %job.fingerprint().short(), active = now_active, "Job admitted");

        job.drive(self.engine.as_ref(), cancel).await;
        Arc::new(job.into_outcome(self.engine.name(), queue_wait, requested.elapsed()))
    }

    /// Completed outcome for a fingerprint, if cached.
    pub fn cached(&self, fingerprint: &Fingerprint) -> Option<Arc<JobOutcome>> {
        self.cache().get(fingerprint).and_then(|slot| slot.get().cloned())
    }

    /// Drop one cache entry. Returns whether anything was removed.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.cache().remove(fingerprint).is_some();
        if removed {
            debug!(fingerprint = %fingerprint.short(), "Invalidated cache entry");
        }
        removed
    }

    /// Drop every cache entry. Jobs still in flight finish for their waiters.
    pub fn clear(&self) -> usize {
        let mut cache = self.cache();
        let count = cache.len();
        cache.clear();
        info!("Cleared {} job(s) from cache", count);
        count
    }

    /// Cancel every queued and running job, and every job submitted until
    /// [`resume`](Self::resume) is called.
    pub fn cancel_all(&self) {
        info!(active = self.active.load(Ordering::SeqCst), "Cancelling all jobs");
        self.cancel.send_replace(true);
    }

    pub fn resume(&self) {
        self.cancel.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Cancel everything, refuse new work, and empty the cache.
    pub fn shutdown(&self) {
        self.cancel_all();
        self.slots.close();
        self.clear();
        info!(engine = self.engine.name(), "Job orchestrator shut down");
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            jobs_started: self.jobs_started.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
            peak_active: self.peak_active.load(Ordering::SeqCst),
            cached: self.cache().len(),
        }
    }
}
