/// LLM Client: the single point of entry for all text-generation calls.
///
/// ARCHITECTURAL RULE: No other module may talk to the Ollama HTTP API directly.
/// Extraction code depends on the `TextGenerator` trait and receives the client
/// as an explicit handle, so a scripted generator can stand in for it in tests.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cannot reach Ollama at {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// The text-generation capability: `(model, prompt) -> text`.
///
/// No streaming and no structured output are assumed.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

/// Ollama HTTP client for local LLM inference.
/// Wraps `/api/generate` (non-streaming) with retry on 429, 5xx and refused connections.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify_transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else if e.is_connect() {
            LlmError::Connection(self.base_url.clone())
        } else {
            LlmError::Http(e)
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    /// Retries on 429, 5xx and connection failures with exponential backoff.
    /// Timeouts are returned immediately; the caller owns the overall time budget.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let request_body = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&url).json(&request_body).send().await {
                Ok(r) => r,
                Err(e) => match self.classify_transport_error(e) {
                    LlmError::Timeout(d) => return Err(LlmError::Timeout(d)),
                    other => {
                        last_error = Some(other);
                        continue;
                    }
                },
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Ollama returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<OllamaErrorBody>(&body)
                    .map(|e| e.error)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let body: GenerateResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Parse(e.to_string()))?;

            debug!(
                "LLM call succeeded: model={}, prompt_tokens={:?}, output_tokens={:?}",
                model, body.prompt_eval_count, body.eval_count
            );

            if body.response.trim().is_empty() {
                return Err(LlmError::EmptyContent);
            }
            return Ok(body.response);
        }

        Err(last_error.unwrap_or(LlmError::Api {
            status: 429,
            message: format!("gave up after {MAX_RETRIES} attempts"),
        }))
    }
}

/// Test doubles for `TextGenerator`.
#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{LlmError, TextGenerator};

    type ReplyFn = dyn Fn(&str, &str) -> Result<String, LlmError> + Send + Sync;

    /// Answers every prompt through a closure and records what it was asked.
    pub struct ScriptedGenerator {
        reply: Box<ReplyFn>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new<F>(reply: F) -> Self
        where
            F: Fn(&str, &str) -> Result<String, LlmError> + Send + Sync + 'static,
        {
            Self {
                reply: Box::new(reply),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str) -> Self {
            let text = text.to_string();
            Self::new(move |_, _| Ok(text.clone()))
        }

        pub fn failing() -> Self {
            Self::new(|_, _| {
                Err(LlmError::Api {
                    status: 500,
                    message: "model crashed".to_string(),
                })
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            (self.reply)(model, prompt)
        }
    }

    /// Never answers within any reasonable time budget.
    pub struct StalledGenerator;

    #[async_trait]
    impl TextGenerator for StalledGenerator {
        async fn generate(&self, _model: &str, _prompt: &str) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("- Name: Too Late".to_string())
        }
    }
}
