//! Generator client
//!
//! The `PatchModel` trait is the seam to the external generative model; the
//! engine only ever talks through it, so tests substitute mocks and the
//! production `GeneratorClient` stays out of the decision logic entirely.
//!
//! The client is constructed explicitly by the run orchestrator and passed
//! in by reference; there is no global lazy-initialized handle. `close()`
//! is likewise owned by the orchestrator.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::config::EngineConfig;

/// OpenRouter-compatible chat completions endpoint.
const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// The seam to the external generative model.
///
/// Both calls return the raw response text; parsing and validation happen in
/// the adapter layers so a malformed response is still available for audit.
pub trait PatchModel {
    /// Request the candidate strategy spectrum for a diagnosis.
    fn generate_strategies(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Request an independent quality review of one candidate.
    fn review_candidate(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

/// Production client for an OpenRouter-style chat completions API.
pub struct GeneratorClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    generator_model: String,
    reviewer_model: String,
    max_attempts: u32,
    request_timeout: Duration,
    cooldown: Duration,
}

impl GeneratorClient {
    pub fn new(api_key: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            generator_model: config.generator_model.clone(),
            reviewer_model: config.reviewer_model.clone(),
            max_attempts: config.max_attempts.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
        }
    }

    /// Point the client at a different endpoint (self-hosted gateways, tests).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Shut the client down, dropping its connection pool.
    ///
    /// Owned by the run orchestrator: the engine borrows the client and must
    /// never tear it down mid-run.
    pub fn close(self) {
        drop(self);
    }

    async fn call(&self, model: &str, system: &str, user: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: false,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let send = self
                .http
                .post(&self.api_url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send();

            // A timed-out call is a generation failure for this candidate,
            // not something to retry into a slower run.
            let response = tokio::time::timeout(self.request_timeout, send)
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "Generator call timed out after {}s",
                        self.request_timeout.as_secs()
                    )
                })??;

            let status = response.status();
            let text = response.text().await?;

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                    anyhow::anyhow!("Failed to parse generator response: {}\n{}", e, truncate_str(&text, 400))
                })?;
                let content = parsed
                    .choices
                    .first()
                    .map(|c| c.message.content.clone())
                    .unwrap_or_default();
                if content.is_empty() {
                    return Err(anyhow::anyhow!("Generator returned an empty response"));
                }
                return Ok(content);
            }

            if let Some(wait) = retry_delay(
                status.as_u16(),
                &text,
                attempt,
                self.max_attempts,
                self.cooldown,
            ) {
                tracing::warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    wait_secs = wait.as_secs(),
                    "generator rate limited, cooling down"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let message = match status.as_u16() {
                401 => "Generator API key rejected".to_string(),
                429 => format!("Generator rate limited after {} attempts", attempt),
                500..=599 => format!("Generator server error ({})", status),
                _ => format!("Generator API error {}: {}", status, truncate_str(&text, 200)),
            };
            return Err(anyhow::anyhow!("{}", message));
        }
    }
}

impl PatchModel for GeneratorClient {
    fn generate_strategies(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send {
        self.call(&self.generator_model, system, user)
    }

    fn review_candidate(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send {
        self.call(&self.reviewer_model, system, user)
    }
}

/// Whether a failed attempt should be retried, and after how long.
///
/// Only rate limiting (429) is retryable, and only while attempts remain in
/// the budget. The wait honors a retry-after hint in the response body,
/// falling back to exponential backoff on the configured cooldown.
fn retry_delay(
    status: u16,
    body: &str,
    attempt: u32,
    max_attempts: u32,
    cooldown: Duration,
) -> Option<Duration> {
    if status != 429 || attempt >= max_attempts {
        return None;
    }
    Some(
        parse_retry_after(body)
            .map(Duration::from_secs)
            .unwrap_or_else(|| cooldown * 2u32.saturating_pow(attempt - 1)),
    )
}

/// Extract a retry-after hint from a rate-limit response body, if present.
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry")?;
    let after_retry = &text_lower[pos..];
    for word in after_retry.split_whitespace().skip(1).take(5) {
        if let Ok(secs) = word
            .trim_matches(|c: char| !c.is_numeric())
            .parse::<u64>()
        {
            if secs > 0 && secs < 300 {
                return Some(secs);
            }
        }
    }
    None
}

/// Truncate a string for error messages (Unicode-safe).
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}
