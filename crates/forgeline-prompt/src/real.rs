use std::sync::Arc;

use async_trait::async_trait;
use forgeline_core::{ForgeError, ForgeResult};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::client::LmClient;
use crate::kind::CompletionRequest;
use crate::retry::{is_retryable, RetryPolicy};

/// Calls a real, HTTP-accessible completion provider. Retries transport
/// failures with exponential backoff and ±20% jitter, and bounds
/// in-flight concurrency with a semaphore to respect provider rate limits.
pub struct RealLmClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    policy: RetryPolicy,
    inflight: Arc<Semaphore>,
}

#[derive(Deserialize)]
struct ProviderResponse {
    text: String,
}

impl RealLmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            policy: RetryPolicy::default(),
            inflight: Arc::new(Semaphore::new(4)),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Configurable max in-flight concurrency (default 4).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.inflight = Arc::new(Semaphore::new(max));
        self
    }

    async fn attempt(&self, prompt: &str) -> Result<String, AttemptError> {
        let response = self
            .http
            .post(format!("{}/v1/complete", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "prompt": prompt }))
            .send()
            .await
            .map_err(|e| AttemptError {
                status: e.status().map(|s| s.as_u16()),
                timed_out: e.is_timeout(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError {
                status: Some(status.as_u16()),
                timed_out: false,
                message: format!("{status}: {body}"),
            });
        }

        let parsed: ProviderResponse = response.json().await.map_err(|e| AttemptError {
            status: None,
            timed_out: false,
            message: e.to_string(),
        })?;
        Ok(parsed.text)
    }
}

struct AttemptError {
    status: Option<u16>,
    timed_out: bool,
    message: String,
}

#[async_trait]
impl LmClient for RealLmClient {
    async fn complete(&self, request: CompletionRequest) -> ForgeResult<String> {
        let _permit = self
            .inflight
            .acquire()
            .await
            .map_err(|e| ForgeError::Internal(format!("LM concurrency semaphore closed: {e}")))?;

        let mut last_error = String::new();
        for attempt in 0..=self.policy.max_retries {
            match self.attempt(&request.prompt).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    last_error = err.message.clone();
                    let retryable = is_retryable(err.status, err.timed_out);
                    if !retryable || attempt == self.policy.max_retries {
                        warn!(attempt, retryable, error = %last_error, "LM call failed, giving up");
                        break;
                    }
                    let delay = self.policy.backoff_with_jitter(attempt);
                    info!(attempt, delay_ms = delay.as_millis() as u64, "retrying LM call after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(ForgeError::UpstreamUnavailable(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::PromptKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_response_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/complete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "ok"})))
            .mount(&server)
            .await;

        let client = RealLmClient::new(server.uri(), "test-model", "key");
        let text = client
            .complete(CompletionRequest::new("hi", PromptKind::Markdown))
            .await
            .expect("should succeed");
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn persistent_503_raises_upstream_unavailable_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/complete"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RealLmClient::new(server.uri(), "test-model", "key").with_retry_policy(RetryPolicy {
            max_retries: 1,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            jitter_fraction: 0.0,
        });

        let err = client
            .complete(CompletionRequest::new("hi", PromptKind::Markdown))
            .await
            .expect_err("should fail");
        assert!(matches!(err, ForgeError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn bad_request_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/complete"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = RealLmClient::new(server.uri(), "test-model", "key").with_retry_policy(RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            jitter_fraction: 0.0,
        });

        let err = client
            .complete(CompletionRequest::new("hi", PromptKind::Markdown))
            .await
            .expect_err("should fail");
        assert!(matches!(err, ForgeError::UpstreamUnavailable(_)));
    }
}
