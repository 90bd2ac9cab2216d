//! Completion client for OpenAI-compatible chat endpoints.
//!
//! - 429, 5xx, timeouts and connection errors are transient: retried with
//!   backoff up to `max_retries` attempts
//! - 401/403 and 404 are fatal and returned immediately
//! - with a single attempt the last error is returned as is; otherwise it is
//!   wrapped in `MaxRetriesExceeded` carrying the attempt count

use crate::client::{HealthCheckResult, HealthStatus, RateLimiter};
use crate::models::{CompletionConfig, CompletionError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// System message sent ahead of every prompt.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant that helps people find information.";

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl From<&CompletionConfig> for SamplingParams {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Anything that turns a prompt into generated text.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String, CompletionError>;
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for any OpenAI-compatible chat completion endpoint.
pub struct LLMClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    rate_limiter: Arc<RateLimiter>,
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
}

impl LLMClient {
    /// Create a new completion client.
    pub fn new(
        api_key: String,
        base_url: String,
        timeout_secs: u64,
        max_retries: u32,
        rate_limiter: Option<Arc<RateLimiter>>,
    ) -> Result<Self, CompletionError> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: max_retries.max(1),
            rate_limiter: rate_limiter.unwrap_or_else(|| Arc::new(RateLimiter::new())),
            total_input_tokens: AtomicU64::new(0),
            total_output_tokens: AtomicU64::new(0),
        })
    }

    /// Build from the `[completion]` config section.
    pub fn from_config(config: &CompletionConfig, api_key: String) -> Result<Self, CompletionError> {
        Self::new(
            api_key,
            config.base_url.clone(),
            config.timeout_secs,
            config.max_retries,
            None,
        )
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// Send a chat request, retrying transient failures.
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        params: &SamplingParams,
    ) -> Result<String, CompletionError> {
        let request = ChatCompletionRequest {
            model: &params.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error: Option<CompletionError> = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.wait_if_needed(&params.model).await;

            let response = match self
                .client
                .post(&url)
                .headers(self.headers())
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        CompletionError::Timeout(self.timeout)
                    } else {
                        CompletionError::Network(e)
                    });
                    self.backoff(attempt, "network error").await;
                    continue;
                }
            };

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            self.rate_limiter
                .record_request(&params.model, status, &headers);

            if status == 429 {
                let retry_after = headers
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0);
                debug!(
                    attempt,
                    retry_after_secs = retry_after,
                    "Rate limited by completion endpoint"
                );
                last_error = Some(CompletionError::RateLimited {
                    retry_after_secs: retry_after,
                });
                // The rate limiter enforces the wait before the next attempt.
                continue;
            }

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);

                let error = match status {
                    401 | 403 => CompletionError::AuthenticationFailed,
                    404 => CompletionError::ModelNotFound(params.model.clone()),
                    _ => CompletionError::Api { status, message },
                };

                if !error.is_retryable() {
                    return Err(error);
                }
                last_error = Some(error);
                self.backoff(attempt, "server error").await;
                continue;
            }

            let body: ChatCompletionResponse = response.json().await.map_err(|e| {
                CompletionError::InvalidResponse(format!("failed to parse response: {e}"))
            })?;

            if let Some(usage) = &body.usage {
                self.total_input_tokens
                    .fetch_add(usage.prompt_tokens as u64, Ordering::Relaxed);
                self.total_output_tokens
                    .fetch_add(usage.completion_tokens as u64, Ordering::Relaxed);
            }

            return body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| CompletionError::InvalidResponse("no choices in response".to_string()));
        }

        Err(match last_error {
            Some(e) if self.max_retries <= 1 => e,
            Some(e) => CompletionError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: e.to_string(),
            },
            None => CompletionError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "unknown error".to_string(),
            },
        })
    }

    async fn backoff(&self, attempt: u32, reason: &str) {
        if attempt + 1 < self.max_retries {
            let backoff = Duration::from_secs(2u64.pow(attempt));
            debug!(
                attempt,
                backoff_secs = backoff.as_secs(),
                reason,
                "Retrying completion"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// (input, output) tokens used so far.
    pub fn total_tokens(&self) -> (u64, u64) {
        (
            self.total_input_tokens.load(Ordering::Relaxed),
            self.total_output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Health check: ping the /models endpoint.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let url = format!("{}/models", self.base_url);

        match self
            .client
            .get(&url)
            .headers(self.headers())
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let (status, error) = if response.status().is_success() {
                    (HealthStatus::Healthy, None)
                } else {
                    (
                        HealthStatus::Unhealthy,
                        Some(format!("HTTP {}", response.status().as_u16())),
                    )
                };
                HealthCheckResult {
                    endpoint: self.base_url.clone(),
                    status,
                    latency_ms: Some(latency_ms),
                    error,
                }
            }
            Err(e) => HealthCheckResult {
                endpoint: self.base_url.clone(),
                status: HealthStatus::Unreachable,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl Completer for LLMClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String, CompletionError> {
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        self.chat(messages, params).await
    }
}
