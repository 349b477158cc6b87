//! OpenAI-compatible chat-completion backend.
//!
//! Each tier's `model` is sent as the request model, so switching tiers is a
//! matter of naming a different preset on the provider side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ExecutionBackend, ExecutionOutcome, ExecutionRequest};
use crate::error::{Result, TierflowError};

/// Longest slice of an error body kept in failure messages.
const ERROR_BODY_LIMIT: usize = 200;

/// HTTP backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// Provider base URL, e.g. `https://openrouter.ai/api/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path appended to `base_url`
    #[serde(default = "default_chat_path")]
    pub chat_path: String,

    /// Bearer token; omitted from requests when unset
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            api_key: None,
        }
    }
}

impl fmt::Debug for HttpBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackendConfig")
            .field("base_url", &self.base_url)
            .field("chat_path", &self.chat_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn default_base_url() -> String { "https://openrouter.ai/api/v1".to_string() }
fn default_chat_path() -> String { "/chat/completions".to_string() }

impl HttpBackendConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.chat_path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Runs attempts against a chat-completion endpoint.
pub struct HttpExecutionBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpExecutionBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tierflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TierflowError::Backend(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Set custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn build_body<'a>(&self, request: &'a ExecutionRequest) -> ChatRequest<'a> {
        let prompt = match request.payload.get("prompt").and_then(|p| p.as_str()) {
            Some(prompt) => prompt.to_string(),
            None => request.payload.to_string(),
        };
        ChatRequest {
            model: &request.tier.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: format!("stage: {}", request.stage),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        }
    }
}

#[async_trait]
impl ExecutionBackend for HttpExecutionBackend {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let mut builder = self
            .client
            .post(self.config.endpoint())
            .timeout(request.deadline)
            .json(&self.build_body(&request));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ExecutionOutcome::Timeout,
            Err(e) => {
                warn!(job_id = %request.job_id, error = %e, "Execution request failed");
                return ExecutionOutcome::failure(format!("request failed: {}", e));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return ExecutionOutcome::Timeout;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            debug!(
                job_id = %request.job_id,
                status = status.as_u16(),
                model = %request.tier.model,
                "Backend returned an error status"
            );
            return ExecutionOutcome::failure(format!(
                "backend returned {}: {}",
                status.as_u16(),
                snippet
            ));
        }

        match response.json::<serde_json::Value>().await {
            Ok(body) => ExecutionOutcome::Success(body),
            Err(e) if e.is_timeout() => ExecutionOutcome::Timeout,
            Err(e) => ExecutionOutcome::failure(format!("invalid response body: {}", e)),
        }
    }
}
