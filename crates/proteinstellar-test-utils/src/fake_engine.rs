use async_trait::async_trait;
use proteinstellar_common::{EngineConfig, Sequence};
use proteinstellar_engine::{EngineError, FoldingEngine, JobHandle, PollStatus, StructurePayload, TerminalReason};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How the fake engine treats a sequence.
#[derive(Debug, Clone)]
pub enum Script {
    /// Accept, report `Running` for `running_for`, then return `payload`
    Succeed { payload: String, running_for: Duration },
    /// Submission never returns; only the caller's timeout ends it
    HangOnSubmit,
    /// Every submission fails with this error
    RejectSubmit(EngineError),
    /// Accept, then report this failure on the first poll
    FailJob(EngineError),
    /// The first `failures` submissions fail transiently, later ones succeed
    Flaky { failures: u32, payload: String },
}

impl Script {
    pub fn succeed(payload: impl Into<String>) -> Self {
        Script::Succeed { payload: payload.into(), running_for: Duration::ZERO }
    }

    pub fn succeed_after(payload: impl Into<String>, running_for: Duration) -> Self {
        Script::Succeed { payload: payload.into(), running_for }
    }
}

struct FakeJob {
    script: Script,
    started: Instant,
}

/// In-memory [`FoldingEngine`] for tests.
pub struct FakeEngine {
    default: Script,
    scripts: HashMap<String, Script>,
    next_id: AtomicU64,
    submissions: AtomicUsize,
    per_sequence: Mutex<HashMap<String, u32>>,
    order: Mutex<Vec<String>>,
    jobs: Mutex<HashMap<String, FakeJob>>,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    cancellations: AtomicUsize,
}

impl FakeEngine {
    /// Engine applying `default` to every sequence without its own script.
    pub fn new(default: Script) -> Self {
        Self {
            default,
            scripts: HashMap::new(),
            next_id: AtomicU64::new(1),
            submissions: AtomicUsize::new(0),
            per_sequence: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            jobs: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
        }
    }

    pub fn with_script(mut self, sequence: &str, script: Script) -> Self {
        self.scripts.insert(sequence.to_string(), script);
        self
    }

    /// Submission calls received, failed ones included.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn submissions_for(&self, sequence: &str) -> u32 {
        self.per_sequence.lock().unwrap().get(sequence).copied().unwrap_or(0)
    }

    /// Sequences in the order their submissions reached the engine.
    pub fn submission_order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    /// Jobs accepted and not yet finished or cancelled.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    fn script_for(&self, sequence: &str) -> Script {
        self.scripts.get(sequence).unwrap_or(&self.default).clone()
    }

    fn finish(&self, id: &str) {
        if self.jobs.lock().unwrap().remove(id).is_some() {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl FoldingEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn submit(&self, sequence: &Sequence, _config: &EngineConfig) -> Result<JobHandle, EngineError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let nth = {
            let mut counts = self.per_sequence.lock().unwrap();
            let n = counts.entry(sequence.as_str().to_string()).or_insert(0);
            *n += 1;
            *n
        };
        self.order.lock().unwrap().push(sequence.as_str().to_string());

        let script = self.script_for(sequence.as_str());
        match &script {
            Script::HangOnSubmit => std::future::pending::<()>().await,
            Script::RejectSubmit(err) => return Err(err.clone()),
            Script::Flaky { failures, .. } if nth <= *failures => {
                return Err(EngineError::transient(format!("flaky submission {}", nth)));
            }
            _ => {}
        }

        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.jobs.lock().unwrap().insert(id.clone(), FakeJob { script, started: Instant::now() });
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now_active, Ordering::SeqCst);
        Ok(JobHandle::new(id))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollStatus, EngineError> {
        let (script, started) = {
            let jobs = self.jobs.lock().unwrap();
            let job = jobs.get(&handle.id).ok_or_else(|| {
                EngineError::terminal(TerminalReason::Rejected, format!("unknown job {}", handle))
            })?;
            (job.script.clone(), job.started)
        };

        let status = match script {
            Script::Succeed { payload, running_for } => {
                if started.elapsed() < running_for {
                    return Ok(PollStatus::Running);
                }
                PollStatus::Succeeded(StructurePayload::from(payload))
            }
            Script::Flaky { payload, .. } => PollStatus::Succeeded(StructurePayload::from(payload)),
            Script::FailJob(err) => PollStatus::Failed(err),
            Script::HangOnSubmit | Script::RejectSubmit(_) => {
                PollStatus::Failed(EngineError::terminal(TerminalReason::Other, "job should not exist"))
            }
        };
        self.finish(&handle.id);
        Ok(status)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), EngineError> {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        self.finish(&handle.id);
        Ok(())
    }
}
