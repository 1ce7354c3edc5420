//! Proteinstellar Engine - driving external folding engines.
//!
//! 1. [`backend`]: the [`FoldingEngine`] capability (submit / poll / cancel)
//! 2. [`http`] and [`local`]: remote REST and local-process adapters
//! 3. [`job`]: one request as an explicit state machine with retry and backoff
//! 4. [`orchestrator`]: bounded concurrency, FIFO admission, fingerprint cache

pub mod backend;
pub mod error;
pub mod http;
pub mod job;
pub mod local;
pub mod orchestrator;

pub use backend::{FoldingEngine, JobHandle, PollStatus, StructurePayload};
pub use error::{EngineError, TerminalReason};
pub use http::HttpFoldingEngine;
pub use job::{ErrorRecord, JobDiagnostics, JobOutcome, JobState, Next, PredictionJob};
pub use local::LocalProcessEngine;
pub use orchestrator::{JobOrchestrator, JobResult, OrchestratorStats};

use proteinstellar_common::{PipelineConfig, StellarError};
use std::sync::Arc;

/// Build the engine adapter a configuration asks for. HTTP transport wins
/// when both are configured.
pub fn engine_from_config(config: &PipelineConfig) -> Result<Arc<dyn FoldingEngine>, StellarError> {
    let name = config.engine.engine.clone();
    if let Some(http) = &config.transport.http {
        let engine = HttpFoldingEngine::new(name, http).map_err(|e| StellarError::config(e.to_string()))?;
        return Ok(Arc::new(engine));
    }
    if let Some(local) = &config.transport.local {
        return Ok(Arc::new(LocalProcessEngine::new(name, local.clone())));
    }
    Err(StellarError::config("no engine transport configured: set [transport.http] or [transport.local]"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proteinstellar_common::{HttpEngineSettings, LocalEngineSettings};
    use std::path::PathBuf;

    #[test]
    fn test_engine_from_config() {
        let mut config = PipelineConfig::default();
        assert!(matches!(engine_from_config(&config), Err(StellarError::Config(_))));

        config.transport.local = Some(LocalEngineSettings {
            executable: PathBuf::from("colabfold_batch"),
            args: vec![],
            work_dir: PathBuf::from("/tmp/proteinstellar"),
            keep_job_dirs: false,
        });
        assert_eq!(engine_from_config(&config).unwrap().name(), "colabfold");

        config.transport.http = Some(HttpEngineSettings::new("http://localhost:8080"));
        config.engine.engine = "esmfold".to_string();
        assert_eq!(engine_from_config(&config).unwrap().name(), "esmfold");
    }
}
