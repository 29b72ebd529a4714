use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;

/// The text-generation capability an agent calls. `system` carries the
/// agent's role context; `prompt` carries the stage instruction. Iteration
/// and rate caps are enforced by the calling agent, not the provider.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn with_config(base_url: String, model: String) -> Self {
        OllamaClient {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn get_model(&self) -> &str {
        &self.model
    }
}

fn classify_status(status: StatusCode) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Auth(format!("Ollama API error: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::RateLimit(format!("Ollama API error: {status}"))
        }
        _ => ProviderError::Transport(format!("Ollama API error: {status}")),
    }
}

#[async_trait]
impl CapabilityProvider for OllamaClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending chat request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(classify_status(response.status()));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(chat.message.content)
    }
}
