//! Chat completion service client.
//!
//! The relay only depends on [`CompletionClient`]; production uses an
//! OpenAI-compatible HTTP endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

/// One prompt message in the OpenAI chat format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl CompletionMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion service is not configured")]
    Disabled,

    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response had no string content in its first choice
    #[error("completion response had no text content")]
    EmptyResponse,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, CompletionError>;
}

/// Client for `/v1/chat/completions` style endpoints
pub struct OpenAiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("shieldd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [CompletionMessage],
}

/// First choice's text, if it is a string
fn extract_content(body: &serde_json::Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        let body: serde_json::Value = response.json().await?;
        extract_content(&body).ok_or(CompletionError::EmptyResponse)
    }
}

/// Used when no API key is configured; every call fails
pub struct DisabledClient;

#[async_trait]
impl CompletionClient for DisabledClient {
    async fn complete(&self, _messages: &[CompletionMessage]) -> Result<String, CompletionError> {
        Err(CompletionError::Disabled)
    }
}

/// Build the completion client described by the config
pub fn from_config(config: &LlmConfig) -> anyhow::Result<Arc<dyn CompletionClient>> {
    match config.api_key.as_deref().filter(|key| !key.is_empty()) {
        Some(key) => {
            tracing::info!(model = %config.model, "Completion service configured");
            Ok(Arc::new(OpenAiClient::new(config, key.to_string())?))
        }
        None => {
            tracing::warn!("No LLM API key configured, chat replies will use the fallback text");
            Ok(Arc::new(DisabledClient))
        }
    }
}
