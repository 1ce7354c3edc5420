//! Remote folding service over a small REST job API.
//!
//!   POST   {base}/jobs              submit, returns `{"id": ...}`
//!   GET    {base}/jobs/{id}         status, returns `{"status": ..., "error": ...}`
//!   GET    {base}/jobs/{id}/result  structure file body
//!   DELETE {base}/jobs/{id}         cancel

use async_trait::async_trait;
use proteinstellar_common::{EngineConfig, HttpEngineSettings, Sequence};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::backend::{FoldingEngine, JobHandle, PollStatus, StructurePayload};
use crate::error::{EngineError, TerminalReason};

pub struct HttpFoldingEngine {
    name: String,
    base_url: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpFoldingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFoldingEngine")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpFoldingEngine {
    pub fn new(name: impl Into<String>, settings: &HttpEngineSettings) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| EngineError::terminal(TerminalReason::Other, format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            name: name.into(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key(),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "job_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    /// Engine's own failure category, when it reports one
    #[serde(default)]
    error_kind: Option<String>,
}

async fn check_response_status(resp: reqwest::Response) -> Result<reqwest::Response, EngineError> {
    let status = resp.status().as_u16();
    if status < 400 {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Map an HTTP failure status onto the engine error taxonomy.
fn classify_status(status: u16, body: &str) -> EngineError {
    let message = extract_message(body).unwrap_or_else(|| format!("HTTP {}", status));
    match status {
        429 => EngineError::transient(format!("rate limited: {}", message)),
        500..=599 => EngineError::transient(format!("HTTP {}: {}", status, message)),
        400 | 422 => EngineError::terminal(TerminalReason::InvalidSequence, message),
        402 => EngineError::terminal(TerminalReason::QuotaExhausted, message),
        _ => EngineError::terminal(TerminalReason::Rejected, format!("HTTP {}: {}", status, message)),
    }
}

fn extract_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json["error"]["message"]
        .as_str()
        .or_else(|| json["error"].as_str())
        .or_else(|| json["message"].as_str())
        .map(str::to_string)
}

/// Translate a status document. `None` means the job finished successfully and
/// the result must be fetched.
fn interpret_status(doc: &StatusResponse) -> Option<PollStatus> {
    match doc.status.to_ascii_lowercase().as_str() {
        "queued" | "pending" | "submitted" => Some(PollStatus::Pending),
        "running" | "processing" => Some(PollStatus::Running),
        "succeeded" | "completed" | "done" => None,
        "failed" | "error" => {
            let message = doc.error.clone().unwrap_or_else(|| "job failed".to_string());
            let error = match doc.error_kind.as_deref() {
                Some("transient") | Some("preempted") => EngineError::transient(message),
                Some("timeout") => EngineError::timeout(message),
                Some("invalid_sequence") => EngineError::terminal(TerminalReason::InvalidSequence, message),
                Some("quota") | Some("quota_exhausted") => EngineError::terminal(TerminalReason::QuotaExhausted, message),
                _ => EngineError::terminal(TerminalReason::Other, message),
            };
            Some(PollStatus::Failed(error))
        }
        "cancelled" | "canceled" => Some(PollStatus::Failed(EngineError::Cancelled)),
        other => Some(PollStatus::Failed(EngineError::terminal(
            TerminalReason::Other,
            format!("unknown job status {:?}", other),
        ))),
    }
}

#[async_trait]
impl FoldingEngine for HttpFoldingEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, sequence: &Sequence, config: &EngineConfig) -> Result<JobHandle, EngineError> {
        let body = serde_json::json!({
            "sequence":   sequence.as_str(),
            "engine":     config.engine,
            "model":      config.model,
            "parameters": config.parameters,
        });
        let resp = self.request(reqwest::Method::POST, "/jobs").json(&body).send().await?;
        let resp = check_response_status(resp).await?;
        let submitted: SubmitResponse = resp.json().await?;
        debug!(job = %submitted.id, residues = sequence.len(), "Submitted folding job");
        Ok(JobHandle::new(submitted.id))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollStatus, EngineError> {
        let resp = self.request(reqwest::Method::GET, &format!("/jobs/{}", handle.id)).send().await?;
        let resp = check_response_status(resp).await?;
        let doc: StatusResponse = resp.json().await?;
        if let Some(status) = interpret_status(&doc) {
            return Ok(status);
        }

        let resp = self.request(reqwest::Method::GET, &format!("/jobs/{}/result", handle.id)).send().await?;
        let resp = check_response_status(resp).await?;
        let bytes = resp.bytes().await?;
        debug!(job = %handle, bytes = bytes.len(), "Fetched structure");
        Ok(PollStatus::Succeeded(StructurePayload::new(bytes.to_vec())))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), EngineError> {
        let resp = self.request(reqwest::Method::DELETE, &format!("/jobs/{}", handle.id)).send().await?;
        check_response_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proteinstellar_common::{Classify, ErrorKind};

    fn status(s: &str, kind: Option<&str>) -> StatusResponse {
        StatusResponse {
            status: s.to_string(),
            error: Some("boom".to_string()),
            error_kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(classify_status(503, "").kind(), ErrorKind::TransientEngine);
        assert_eq!(classify_status(429, "").kind(), ErrorKind::TransientEngine);
        assert!(matches!(
            classify_status(422, r#"{"error": {"message": "bad residue"}}"#),
            EngineError::Terminal { reason: TerminalReason::InvalidSequence, ref message } if message == "bad residue"
        ));
        assert!(matches!(
            classify_status(402, ""),
            EngineError::Terminal { reason: TerminalReason::QuotaExhausted, .. }
        ));
        assert!(matches!(classify_status(404, ""), EngineError::Terminal { reason: TerminalReason::Rejected, .. }));
    }

    #[test]
    fn test_interpret_status() {
        assert_eq!(interpret_status(&status("queued", None)), Some(PollStatus::Pending));
        assert_eq!(interpret_status(&status("RUNNING", None)), Some(PollStatus::Running));
        assert_eq!(interpret_status(&status("completed", None)), None);
        assert_eq!(
            interpret_status(&status("failed", Some("preempted"))),
            Some(PollStatus::Failed(EngineError::transient("boom")))
        );
        assert!(matches!(
            interpret_status(&status("failed", None)),
            Some(PollStatus::Failed(EngineError::Terminal { reason: TerminalReason::Other, .. }))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        std::env::set_var("PROTEINSTELLAR_TEST_HTTP_KEY", "s3cret");
        let mut settings = HttpEngineSettings::new("https://fold.example.org/api/");
        settings.api_key_env = Some("PROTEINSTELLAR_TEST_HTTP_KEY".to_string());
        let engine = HttpFoldingEngine::new("remote", &settings).unwrap();
        let printed = format!("{:?}", engine);
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("https://fold.example.org/api\""));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let mut settings = HttpEngineSettings::new("http://127.0.0.1:9");
        settings.request_timeout_ms = 2_000;
        let engine = HttpFoldingEngine::new("remote", &settings).unwrap();
        let seq = Sequence::new("MKT").unwrap();
        let err = engine.submit(&seq, &EngineConfig::default()).await.unwrap_err();
        assert!(err.is_retryable(), "unexpected {:?}", err);
    }
}
