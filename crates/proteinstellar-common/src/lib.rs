//! Shared types, errors, and configuration used across all Proteinstellar crates.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod sequence;
pub mod telemetry;

// Re-export commonly used types
pub use config::{
    AnalysisSettings, ContactStrategy, EngineConfig, HttpEngineSettings, LocalEngineSettings,
    OrchestratorSettings, PipelineConfig,
};
pub use error::{Classify, ErrorKind, Result, StellarError};
pub use fingerprint::Fingerprint;
pub use sequence::{parse_fasta, Sequence, SequenceInput};
