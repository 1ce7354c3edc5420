//! Folding engine capability and the values crossing it.
//!
//! Backends:
//!   HttpFoldingEngine   : remote REST job API (see [`crate::http`])
//!   LocalProcessEngine  : ColabFold-style executable on this machine (see [`crate::local`])
//!
//! The orchestrator only ever sees `dyn FoldingEngine`.

use async_trait::async_trait;
use proteinstellar_common::{EngineConfig, Sequence};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// Engine-assigned reference to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Raw structure file returned by an engine, not yet parsed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructurePayload {
    pub bytes: Vec<u8>,
}

impl StructurePayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<String> for StructurePayload {
    fn from(text: String) -> Self {
        Self { bytes: text.into_bytes() }
    }
}

impl From<&str> for StructurePayload {
    fn from(text: &str) -> Self {
        Self { bytes: text.as_bytes().to_vec() }
    }
}

// Payloads run to megabytes; keep Debug output to a summary.
impl fmt::Debug for StructurePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructurePayload").field("len", &self.bytes.len()).finish()
    }
}

/// Result of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Accepted, waiting for compute
    Pending,
    Running,
    Succeeded(StructurePayload),
    /// The engine gave up on the job. Transient errors may be resubmitted.
    Failed(EngineError),
}

impl PollStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, PollStatus::Succeeded(_) | PollStatus::Failed(_))
    }
}

#[async_trait]
pub trait FoldingEngine: Send + Sync {
    /// Identifier recorded as structure provenance.
    fn name(&self) -> &str;

    async fn submit(&self, sequence: &Sequence, config: &EngineConfig) -> Result<JobHandle, EngineError>;

    async fn poll(&self, handle: &JobHandle) -> Result<PollStatus, EngineError>;

    /// Ask the engine to stop a job. Best effort: work already committed on the
    /// engine side may still run to completion.
    async fn cancel(&self, handle: &JobHandle) -> Result<(), EngineError>;
}
