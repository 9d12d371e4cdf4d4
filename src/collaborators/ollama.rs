use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::TextGenerator;
use crate::error::CollaboratorError;
use crate::{ChatMessage, Role};

// Structures matching Ollama's /api/chat endpoint
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaChatMessage<'a>>,
    stream: bool, // We want the full response, not a stream
    options: serde_json::Value,
}

#[derive(Serialize)]
struct OllamaChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct OllamaChatResponse {
    message: OllamaReplyMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize, Debug)]
struct OllamaReplyMessage {
    content: String,
}

/// Text generation through a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    #[instrument(skip(self, system_prompt, history), fields(model = %self.model, turns = history.len()))]
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String, CollaboratorError> {
        let ollama_api_url = format!("{}/api/chat", self.base_url);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(OllamaChatMessage {
            role: Role::System.as_str(),
            content: system_prompt,
        });
        messages.extend(history.iter().map(|m| OllamaChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        debug!(prompt_chars = system_prompt.len(), "Sending chat request to Ollama");

        let request_payload = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: serde_json::json!({ "temperature": self.temperature }),
        };

        let response = self
            .client
            .post(&ollama_api_url)
            .json(&request_payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Ollama API request failed");
            return Err(CollaboratorError::Status {
                service: "ollama".to_string(),
                status: status.as_u16(),
                body: error_body,
            });
        }

        let body = response.text().await?;
        let ollama_response: OllamaChatResponse = serde_json::from_str(&body)?;

        debug!(done = ollama_response.done, response = ?ollama_response.message.content, "Received Ollama response");

        Ok(ollama_response.message.content.trim().to_string())
    }
}
