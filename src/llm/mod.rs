//! LLM client abstraction.
//!
//! The assistant only needs plain text back from a model: tool calls are
//! requested through a textual marker, not through native function calling.
//! Every provider therefore implements the same single-method trait.

mod ollama;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{LlmConfig, LlmProvider};

pub use ollama::OllamaClient;
pub use openai::{AuthScheme, OpenAiCompatibleClient};

/// Message role as understood by chat-completion APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Failure calling the model. Never recovered inside the tool loop.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM authentication failed: {0}")]
    Authentication(String),

    #[error("LLM endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("LLM response could not be read: {0}")]
    InvalidResponse(String),

    #[error("LLM did not answer within {0} seconds")]
    Timeout(u64),

    #[error("LLM client misconfigured: {0}")]
    Config(String),
}

/// Classify a reqwest failure, reporting timeouts with the configured limit.
fn request_error(err: reqwest::Error, timeout: Duration) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(timeout.as_secs())
    } else if err.is_decode() {
        LlmError::InvalidResponse(err.to_string())
    } else {
        LlmError::Transport(err.to_string())
    }
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Text-completion capability shared by every provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short provider name for logs and status output.
    fn name(&self) -> &'static str;

    /// Model identifier requests are sent with.
    fn model(&self) -> &str;

    /// Send the full message list and return the assistant's raw text.
    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String>;
}

/// Build the configured provider.
pub fn from_config(config: &LlmConfig) -> LlmResult<Arc<dyn LlmClient>> {
    tracing::info!(
        "Using LLM provider {} (model={}, verify_ssl={})",
        config.provider,
        config.model,
        config.verify_ssl
    );
    if !config.verify_ssl {
        tracing::warn!("SSL verification disabled for LLM API calls");
    }

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| LlmError::Config("API key required".to_string()))?;
            Arc::new(OpenAiCompatibleClient::new(config, AuthScheme::Bearer(key))?)
        }
        LlmProvider::Farm => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| LlmError::Config("API key required".to_string()))?;
            Arc::new(OpenAiCompatibleClient::new(
                config,
                AuthScheme::Header {
                    name: config.auth_header_name.clone(),
                    value: key,
                },
            )?)
        }
        LlmProvider::Ollama => Arc::new(OllamaClient::new(config)?),
    };
    Ok(client)
}

/// Shared reqwest client construction honouring timeout and SSL settings.
fn http_client(config: &LlmConfig) -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .danger_accept_invalid_certs(!config.verify_ssl)
        .build()
        .map_err(|e| LlmError::Config(e.to_string()))
}

/// Map a non-success HTTP status to an error.
fn status_error(status: u16, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::Authentication(format!("HTTP {}: {}", status, body)),
        _ => LlmError::Http { status, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: LlmProvider, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            api_url: "http://localhost:9/v1/chat/completions".to_string(),
            api_key: api_key.map(str::to_string),
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.0,
            verify_ssl: true,
            auth_header_name: "KeyId".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn selects_provider_from_config() {
        let client = from_config(&config(LlmProvider::Farm, Some("k"))).expect("farm");
        assert_eq!(client.name(), "farm");
        assert_eq!(client.model(), "test-model");

        let client = from_config(&config(LlmProvider::OpenAi, Some("k"))).expect("openai");
        assert_eq!(client.name(), "openai");

        let client = from_config(&config(LlmProvider::Ollama, None)).expect("ollama");
        assert_eq!(client.name(), "ollama");
    }

    #[test]
    fn keyed_providers_need_a_key() {
        assert!(matches!(
            from_config(&config(LlmProvider::OpenAi, None)),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn auth_statuses_map_to_authentication() {
        assert!(matches!(
            status_error(401, "nope".into()),
            LlmError::Authentication(_)
        ));
        assert!(matches!(
            status_error(502, "bad gateway".into()),
            LlmError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).expect("serialize");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }
}
