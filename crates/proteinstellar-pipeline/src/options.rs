//! Per-call pipeline options.

use proteinstellar_common::{
    AnalysisSettings, ContactStrategy, EngineConfig, OrchestratorSettings, PipelineConfig, Result, StellarError,
};
use proteinstellar_metrics::ResidueMapping;
use proteinstellar_structure::{ConfidenceScale, ParserOptions, StructureRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Engine call pacing and deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTimeouts {
    pub poll_interval_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub call_timeout_ms: u64,
    pub attempt_timeout_ms: u64,
    pub job_timeout_ms: u64,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self::from(&OrchestratorSettings::default())
    }
}

impl From<&OrchestratorSettings> for JobTimeouts {
    fn from(s: &OrchestratorSettings) -> Self {
        Self {
            poll_interval_ms: s.poll_interval_ms,
            backoff_base_ms: s.backoff_base_ms,
            backoff_max_ms: s.backoff_max_ms,
            call_timeout_ms: s.call_timeout_ms,
            attempt_timeout_ms: s.attempt_timeout_ms,
            job_timeout_ms: s.job_timeout_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Which engine and model parameters to use
    pub engine_config: EngineConfig,
    pub confidence_threshold: f64,
    /// Å
    pub contact_cutoff: f64,
    pub min_sequence_separation: usize,
    pub contact_strategy: ContactStrategy,
    pub max_concurrent_jobs: usize,
    /// Submission attempts per job, first one included
    pub max_retries: u32,
    /// Enables comparative metrics for every input
    pub reference_structure: Option<Arc<StructureRecord>>,
    /// Residue pairing against the reference; index by index when absent
    pub reference_mapping: Option<ResidueMapping>,
    pub timeouts: JobTimeouts,
    pub confidence_scale: ConfidenceScale,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        let analysis = AnalysisSettings::default();
        let orchestrator = OrchestratorSettings::default();
        Self {
            engine_config: EngineConfig::default(),
            confidence_threshold: analysis.confidence_threshold,
            contact_cutoff: analysis.contact_cutoff,
            min_sequence_separation: analysis.min_sequence_separation,
            contact_strategy: analysis.contact_strategy,
            max_concurrent_jobs: orchestrator.max_concurrent_jobs,
            max_retries: orchestrator.max_retries,
            reference_structure: None,
            reference_mapping: None,
            timeouts: JobTimeouts::from(&orchestrator),
            confidence_scale: ConfidenceScale::default(),
        }
    }
}

impl AnalysisOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            engine_config: config.engine.clone(),
            confidence_threshold: config.analysis.confidence_threshold,
            contact_cutoff: config.analysis.contact_cutoff,
            min_sequence_separation: config.analysis.min_sequence_separation,
            contact_strategy: config.analysis.contact_strategy,
            max_concurrent_jobs: config.orchestrator.max_concurrent_jobs,
            max_retries: config.orchestrator.max_retries,
            reference_structure: None,
            reference_mapping: None,
            timeouts: JobTimeouts::from(&config.orchestrator),
            confidence_scale: ConfidenceScale::default(),
        }
    }

    pub fn with_reference(mut self, reference: StructureRecord) -> Self {
        self.reference_structure = Some(Arc::new(reference));
        self
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            confidence_threshold: self.confidence_threshold,
            contact_cutoff: self.contact_cutoff,
            min_sequence_separation: self.min_sequence_separation,
            contact_strategy: self.contact_strategy,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_concurrent_jobs: self.max_concurrent_jobs,
            max_retries: self.max_retries,
            poll_interval_ms: self.timeouts.poll_interval_ms,
            backoff_base_ms: self.timeouts.backoff_base_ms,
            backoff_max_ms: self.timeouts.backoff_max_ms,
            call_timeout_ms: self.timeouts.call_timeout_ms,
            attempt_timeout_ms: self.timeouts.attempt_timeout_ms,
            job_timeout_ms: self.timeouts.job_timeout_ms,
        }
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions { confidence_scale: self.confidence_scale }
    }

    /// Reject unusable options before any work starts.
    pub fn validate(&self) -> Result<()> {
        self.engine_config.validate()?;
        self.analysis_settings().validate()?;
        self.orchestrator_settings().validate()?;
        if let Some(reference) = &self.reference_structure {
            if reference.is_empty() {
                return Err(StellarError::config("reference_structure has no residues"));
            }
        }
        if self.reference_mapping.is_some() && self.reference_structure.is_none() {
            return Err(StellarError::config("reference_mapping given without a reference_structure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proteinstellar_structure::SourceMetadata;

    #[test]
    fn test_defaults_are_valid() {
        AnalysisOptions::default().validate().unwrap();
        let options = AnalysisOptions::from_config(&PipelineConfig::default());
        assert_eq!(options.orchestrator_settings(), OrchestratorSettings::default());
        assert_eq!(options.analysis_settings(), AnalysisSettings::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            AnalysisOptions { confidence_threshold: 2.0, ..Default::default() },
            AnalysisOptions { contact_cutoff: 0.0, ..Default::default() },
            AnalysisOptions { max_concurrent_jobs: 0, ..Default::default() },
            AnalysisOptions { max_retries: 0, ..Default::default() },
            AnalysisOptions { reference_mapping: Some(ResidueMapping::identity(2)), ..Default::default() },
            AnalysisOptions::default().with_reference(StructureRecord::empty(SourceMetadata::default())),
        ];
        for options in bad {
            assert!(matches!(options.validate(), Err(StellarError::Config(_))), "{:?}", options);
        }
    }
}
