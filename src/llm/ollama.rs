//! Ollama native chat client (`POST /api/chat`, non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, request_error, status_error, ChatMessage, LlmClient, LlmError, LlmResult};
use crate::config::LlmConfig;

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout,
        })
    }

    fn chat_url(&self) -> String {
        if self.base_url.ends_with("/api/chat") {
            self.base_url.clone()
        } else {
            format!("{}/api/chat", self.base_url)
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: Options {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned {}: {}", status, body);
            return Err(status_error(status.as_u16(), body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        body.message
            .map(|m| m.content)
            .ok_or_else(|| LlmError::InvalidResponse("response has no message".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    fn client(url: &str) -> OllamaClient {
        OllamaClient::new(&LlmConfig {
            provider: LlmProvider::Ollama,
            api_url: url.to_string(),
            api_key: None,
            model: "llama3".to_string(),
            max_tokens: 128,
            temperature: 0.2,
            verify_ssl: true,
            auth_header_name: "KeyId".to_string(),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[test]
    fn chat_url_appends_api_path_once() {
        assert_eq!(
            client("http://localhost:11434/").chat_url(),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            client("http://gpu-box:11434/api/chat").chat_url(),
            "http://gpu-box:11434/api/chat"
        );
    }
}
