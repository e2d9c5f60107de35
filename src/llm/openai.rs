//! OpenAI-compatible chat completions client.
//!
//! Covers both the public OpenAI API (bearer token) and "LLM farm" style
//! gateways that accept the same request body but authenticate with a
//! custom key header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use super::{http_client, request_error, status_error, ChatMessage, LlmClient, LlmError, LlmResult};
use crate::config::LlmConfig;

/// How the key is attached to each request.
#[derive(Clone)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `<name>: <value>`, e.g. `KeyId: ...`
    Header { name: String, value: String },
}

/// Client for any endpoint speaking the chat-completions format.
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    headers: HeaderMap,
    name: &'static str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig, auth: AuthScheme) -> LlmResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let name = match auth {
            AuthScheme::Bearer(token) => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
                "openai"
            }
            AuthScheme::Header { name, value } => {
                let header = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| LlmError::Config(format!("invalid auth header {}: {}", name, e)))?;
                headers.insert(header, header_value(&value)?);
                "farm"
            }
        };

        Ok(Self {
            client: http_client(config)?,
            url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout,
            headers,
            name,
        })
    }

    fn build_request<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: 1.0,
            stream: false,
        }
    }
}

fn header_value(raw: &str) -> LlmResult<HeaderValue> {
    let mut value = HeaderValue::from_str(raw)
        .map_err(|e| LlmError::Config(format!("invalid header value: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Pull the first choice's text out of a completion body.
fn extract_content(body: CompletionResponse) -> LlmResult<String> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::InvalidResponse("response has no message content".to_string()))
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn name(&self) -> &'static str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String> {
        tracing::debug!(
            "Sending {} messages to {} ({})",
            messages.len(),
            self.url,
            self.name
        );

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&self.build_request(messages))
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("LLM API returned {}: {}", status, body);
            return Err(status_error(status.as_u16(), body));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let content = extract_content(body)?;
        tracing::debug!("LLM response: {}", content);
        Ok(content)
    }
}
