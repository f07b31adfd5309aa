//! OpenAI-compatible chat completions adapter.
//!
//! Works against OpenRouter (the default), OpenAI, and local servers that
//! expose `POST {base_url}/chat/completions`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, instrument};
use url::Url;

use penflow_shared::{GenerationConfig, PenflowError, Result, ServiceError};

use crate::GenerationService;
use crate::retry::RetryPolicy;

const USER_AGENT: &str = concat!("penflow/", env!("CARGO_PKG_VERSION"));

/// Error bodies are cut to this many characters before they land in errors.
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// HTTP generation service with retry and a shared in-flight request limit.
pub struct HttpGenerationService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    timeout_secs: u64,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl HttpGenerationService {
    /// Build an adapter with an explicit API key (`None` sends no auth header).
    pub fn new(config: &GenerationConfig, api_key: Option<String>) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            PenflowError::config(format!("invalid base_url `{}`: {e}", config.base_url))
        })?;
        if config.max_concurrent_requests == 0 {
            return Err(PenflowError::config(
                "max_concurrent_requests must be at least 1",
            ));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PenflowError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base.as_str().trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            retry: RetryPolicy::from_config(config),
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests)),
        })
    }

    /// Build an adapter, reading the API key from the configured env var.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty());
        if api_key.is_none() {
            debug!(var = %config.api_key_env, "no API key set, sending unauthenticated requests");
        }
        Self::new(config, api_key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One HTTP round trip, holding a permit for its duration.
    async fn attempt(&self, instruction: &str) -> std::result::Result<String, ServiceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ServiceError::Transport(format!("request limiter closed: {e}")))?;

        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "system",
                content: instruction,
            }],
            temperature: self.temperature,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        extract_content(&text)
    }

    fn map_transport(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = instruction.len()))]
    async fn generate(&self, instruction: &str) -> std::result::Result<String, ServiceError> {
        let text = self.retry.run(|| self.attempt(instruction)).await?;
        debug!(response_len = text.len(), "generation request succeeded");
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Pull the first choice's message text out of a response body.
fn extract_content(body: &str) -> std::result::Result<String, ServiceError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::MalformedBody(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ServiceError::EmptyResponse)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
