//! Folding with a ColabFold-style executable on this machine.
//!
//! Each job gets its own directory under the configured work dir:
//! `input.fasta`, `stderr.log`, and `out/` where the tool writes ranked models.
//! The directory is removed once the job is read, fails, or is cancelled,
//! unless `keep_job_dirs` is set.
//! The command line is `<exe> <input.fasta> <out_dir> [args] --model-type <model> [--key value ...]`.

use async_trait::async_trait;
use proteinstellar_common::{EngineConfig, LocalEngineSettings, Sequence};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{FoldingEngine, JobHandle, PollStatus, StructurePayload};
use crate::error::{EngineError, TerminalReason};

struct LocalJob {
    child: Child,
    dir: PathBuf,
}

pub struct LocalProcessEngine {
    name: String,
    settings: LocalEngineSettings,
    jobs: Mutex<HashMap<String, LocalJob>>,
}

impl LocalProcessEngine {
    pub fn new(name: impl Into<String>, settings: LocalEngineSettings) -> Self {
        Self { name: name.into(), settings, jobs: Mutex::new(HashMap::new()) }
    }

    pub fn work_dir(&self) -> &Path {
        &self.settings.work_dir
    }

    async fn remove_job_dir(&self, dir: &Path) {
        if self.settings.keep_job_dirs {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), error = %e, "Failed to remove local job directory");
            }
        }
    }

    async fn launch(&self, dir: &Path, sequence: &Sequence, config: &EngineConfig) -> Result<Child, EngineError> {
        let out_dir = dir.join("out");
        tokio::fs::create_dir_all(&out_dir).await?;

        let input = dir.join("input.fasta");
        tokio::fs::write(&input, format!(">query\n{}\n", sequence)).await?;
        let stderr = std::fs::File::create(dir.join("stderr.log"))?;

        let mut command = Command::new(&self.settings.executable);
        command
            .arg(&input)
            .arg(&out_dir)
            .args(&self.settings.args)
            .arg("--model-type")
            .arg(&config.model);
        for (key, value) in &config.parameters {
            command.arg(format!("--{}", key)).arg(value);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::terminal(
                    TerminalReason::Other,
                    format!("failed to launch {}: {}", self.settings.executable.display(), e),
                )
            })
    }

    /// Turn a finished process into a poll status.
    async fn collect(&self, handle: &JobHandle, dir: &Path, status: ExitStatus) -> Result<PollStatus, EngineError> {
        if !status.success() {
            let tail = stderr_tail(dir).await;
            warn!(job = %handle, %status, "Local folding process failed");
            return Ok(PollStatus::Failed(EngineError::terminal(
                TerminalReason::Other,
                format!("process exited with {}: {}", status, tail),
            )));
        }

        match find_result(&dir.join("out")).await? {
            Some(path) => {
                debug!(job = %handle, path = %path.display(), "Reading predicted structure");
                let bytes = tokio::fs::read(&path).await?;
                Ok(PollStatus::Succeeded(StructurePayload::new(bytes)))
            }
            None => Ok(PollStatus::Failed(EngineError::terminal(
                TerminalReason::Other,
                "process exited cleanly but wrote no .pdb model",
            ))),
        }
    }
}

/// Pick the best-ranked model: a file named `*rank_001*.pdb`, else the first
/// `.pdb` in lexical order.
async fn find_result(out_dir: &Path) -> Result<Option<PathBuf>, EngineError> {
    let mut entries = match tokio::fs::read_dir(out_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut models = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("pdb") {
            models.push(path);
        }
    }
    models.sort();

    let ranked = models
        .iter()
        .position(|p| p.file_name().and_then(|n| n.to_str()).map_or(false, |n| n.contains("rank_001")));
    Ok(match ranked {
        Some(i) => Some(models.swap_remove(i)),
        None => models.into_iter().next(),
    })
}

async fn stderr_tail(dir: &Path) -> String {
    let text = tokio::fs::read_to_string(dir.join("stderr.log")).await.unwrap_or_default();
    let lines: Vec<&str> = text.lines().rev().take(5).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join("\n")
}

#[async_trait]
impl FoldingEngine for LocalProcessEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, sequence: &Sequence, config: &EngineConfig) -> Result<JobHandle, EngineError> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.settings.work_dir.join(&id);
        let child = match self.launch(&dir, sequence, config).await {
            Ok(child) => child,
            Err(err) => {
                self.remove_job_dir(&dir).await;
                return Err(err);
            }
        };

        info!(job = %id, executable = %self.settings.executable.display(), "Started local folding process");
        self.jobs.lock().await.insert(id.clone(), LocalJob { child, dir });
        Ok(JobHandle::new(id))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollStatus, EngineError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&handle.id).ok_or_else(|| {
            EngineError::terminal(TerminalReason::Rejected, format!("unknown local job {}", handle))
        })?;

        let Some(status) = job.child.try_wait()? else {
            return Ok(PollStatus::Running);
        };
        let dir = job.dir.clone();
        jobs.remove(&handle.id);
        drop(jobs);

        let result = self.collect(handle, &dir, status).await;
        self.remove_job_dir(&dir).await;
        result
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), EngineError> {
        let job = self.jobs.lock().await.remove(&handle.id);
        if let Some(mut job) = job {
            let killed = job.child.kill().await;
            self.remove_job_dir(&job.dir).await;
            killed?;
            info!(job = %handle, "Killed local folding process");
        }
        Ok(())
    }
}
