//! Configuration loading for Proteinstellar.
//! Reads proteinstellar.toml from the current directory or the path in the
//! PROTEINSTELLAR_CONFIG env var. YAML and JSON files are accepted by extension.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StellarError};

pub const CONFIG_ENV_VAR: &str = "PROTEINSTELLAR_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "proteinstellar.toml";

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Which folding engine and model parameters to use
    #[serde(default)]
    pub engine: EngineConfig,

    /// How to reach the engine
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub analysis: AnalysisSettings,

    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

// ── Engine identity ──────────────────────────────────────────────────────────

/// Engine identity and model parameters.
///
/// This is the part of the configuration that changes what structure comes
/// back, so it participates in job fingerprints. Transport details do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine identifier (e.g. "colabfold", "esmfold")
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Model preset (e.g. "alphafold2_ptm")
    #[serde(default = "default_model")]
    pub model: String,

    /// Free-form model parameters, ordered for stable hashing
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn default_engine() -> String { "colabfold".to_string() }
fn default_model() -> String { "alphafold2_ptm".to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            model: default_model(),
            parameters: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn new(engine: impl Into<String>, model: impl Into<String>) -> Self {
        Self { engine: engine.into(), model: model.into(), parameters: BTreeMap::new() }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.trim().is_empty() {
            return Err(StellarError::config("engine.engine must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(StellarError::config("engine.model must not be empty"));
        }
        Ok(())
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    pub http: Option<HttpEngineSettings>,
    pub local: Option<LocalEngineSettings>,
}

/// Remote folding service reachable over a REST job API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpEngineSettings {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 { 30_000 }

impl HttpEngineSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key_env: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<SecretString> {
        let var = self.api_key_env.as_deref()?;
        match std::env::var(var) {
            Ok(key) if !key.is_empty() => Some(SecretString::from(key)),
            _ => {
                tracing::warn!("API key env var {} is configured but not set", var);
                None
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Folding executable run on this machine (ColabFold-style CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEngineSettings {
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// Extra arguments appended after `<input> <output_dir>`
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Leave each job's directory in place after it finishes, for debugging
    #[serde(default)]
    pub keep_job_dirs: bool,
}

fn default_executable() -> PathBuf { PathBuf::from("colabfold_batch") }
fn default_work_dir() -> PathBuf { PathBuf::from("./workspace/predictions") }

impl Default for LocalEngineSettings {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            args: Vec::new(),
            work_dir: default_work_dir(),
            keep_job_dirs: false,
        }
    }
}

// ── Analysis ─────────────────────────────────────────────────────────────────

/// How contacts are enumerated. Both strategies give identical counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStrategy {
    /// All-pairs for small inputs, grid above a size threshold
    #[default]
    Auto,
    AllPairs,
    Grid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Residues strictly below this normalized confidence are "low confidence"
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Contact distance cutoff in Å between representative atoms
    #[serde(default = "default_contact_cutoff")]
    pub contact_cutoff: f64,

    /// Minimum |i - j| along the chain for a pair to count as a contact
    #[serde(default = "default_min_separation")]
    pub min_sequence_separation: usize,

    #[serde(default)]
    pub contact_strategy: ContactStrategy,
}

fn default_confidence_threshold() -> f64 { 0.5 }
fn default_contact_cutoff() -> f64 { 8.0 }
fn default_min_separation() -> usize { 1 }

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            contact_cutoff: default_contact_cutoff(),
            min_sequence_separation: default_min_separation(),
            contact_strategy: ContactStrategy::default(),
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.confidence_threshold.is_finite() || !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(StellarError::config(format!(
                "analysis.confidence_threshold must lie in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !self.contact_cutoff.is_finite() || self.contact_cutoff <= 0.0 {
            return Err(StellarError::config(format!(
                "analysis.contact_cutoff must be a positive distance, got {}",
                self.contact_cutoff
            )));
        }
        if self.min_sequence_separation == 0 {
            return Err(StellarError::config("analysis.min_sequence_separation must be at least 1"));
        }
        Ok(())
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: usize,

    /// Maximum number of submission attempts per job (first try included)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Bound on a single submit/poll/cancel call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Bound on one submission attempt, from submit until a final poll status
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Bound on the whole job, retries and backoff included
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
}

fn default_max_concurrent() -> usize { 4 }
fn default_max_retries() -> u32 { 3 }
fn default_poll_interval_ms() -> u64 { 5_000 }
fn default_backoff_base_ms() -> u64 { 1_000 }
fn default_backoff_max_ms() -> u64 { 60_000 }
fn default_call_timeout_ms() -> u64 { 60_000 }
fn default_attempt_timeout_ms() -> u64 { 60 * 60 * 1_000 }
fn default_job_timeout_ms() -> u64 { 3 * 60 * 60 * 1_000 }

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            job_timeout_ms: default_job_timeout_ms(),
        }
    }
}

impl OrchestratorSettings {
    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
    pub fn call_timeout(&self) -> Duration { Duration::from_millis(self.call_timeout_ms) }
    pub fn attempt_timeout(&self) -> Duration { Duration::from_millis(self.attempt_timeout_ms) }
    pub fn job_timeout(&self) -> Duration { Duration::from_millis(self.job_timeout_ms) }

    /// Delay before submission attempt `attempt + 1`, doubling from the base
    /// and capped at `backoff_max_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let ms = self.backoff_base_ms.saturating_mul(1u64 << exp).min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(StellarError::config("orchestrator.max_concurrent_jobs must be at least 1"));
        }
        if self.max_retries == 0 {
            return Err(StellarError::config("orchestrator.max_retries must be at least 1"));
        }
        let durations = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("call_timeout_ms", self.call_timeout_ms),
            ("attempt_timeout_ms", self.attempt_timeout_ms),
            ("job_timeout_ms", self.job_timeout_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(StellarError::config(format!("orchestrator.{} must be positive", name)));
            }
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(StellarError::config("orchestrator.backoff_max_ms is below backoff_base_ms"));
        }
        Ok(())
    }
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl PipelineConfig {
    /// Load configuration from proteinstellar.toml.
    /// Checks PROTEINSTELLAR_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StellarError::config(format!("Config file not found: {}", path.display())));
        }

        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        config.validate()?;
        tracing::debug!(path = %path.display(), engine = %config.engine.engine, "Loaded pipeline config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.analysis.validate()?;
        self.orchestrator.validate()?;
        if let Some(http) = &self.transport.http {
            if http.base_url.trim().is_empty() {
                return Err(StellarError::config("transport.http.base_url must not be empty"));
            }
        }
        Ok(())
    }
}
