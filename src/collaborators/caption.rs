use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument, warn};

use super::Captioner;
use crate::error::CollaboratorError;

const CAPTION_PROMPT: &str =
    "Describe this image in one sentence, focusing on subject, setting and lighting.";

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Primary captioner: a vision model served by the local Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaVisionCaptioner {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaVisionCaptioner {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Captioner for OllamaVisionCaptioner {
    #[instrument(skip(self), fields(model = %self.model))]
    async fn caption(&self, image_path: &Path) -> Result<Option<String>, CollaboratorError> {
        let bytes = tokio::fs::read(image_path).await?;
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt: CAPTION_PROMPT,
            images: vec![BASE64.encode(&bytes)],
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                service: "ollama-vision".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: OllamaGenerateResponse = serde_json::from_str(&body)?;
        let caption = parsed.response.trim().to_string();
        debug!(%caption, "Vision model caption");
        Ok(Some(caption).filter(|c| !c.is_empty()))
    }

    fn name(&self) -> &str {
        "ollama-vision"
    }
}

/// Secondary captioner: the hosted BLIP model on the Hugging Face Inference API.
/// Without a token it reports itself unavailable.
#[derive(Debug, Clone)]
pub struct HuggingFaceCaptioner {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HuggingFaceCaptioner {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Captioner for HuggingFaceCaptioner {
    #[instrument(skip(self))]
    async fn caption(&self, image_path: &Path) -> Result<Option<String>, CollaboratorError> {
        let Some(token) = self.token.as_deref() else {
            debug!("HF_TOKEN not set, skipping hosted captioner");
            return Ok(None);
        };

        let bytes = tokio::fs::read(image_path).await?;
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Hugging Face caption request failed");
            return Err(CollaboratorError::Status {
                service: "huggingface".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        // Expected shape: [{"generated_text": "..."}]
        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        let caption = value
            .get(0)
            .and_then(|first| first.get("generated_text"))
            .and_then(|text| text.as_str())
            .map(|text| text.trim().to_string())
            .ok_or_else(|| CollaboratorError::Parse {
                message: format!("unexpected caption payload: {}", body),
            })?;
        Ok(Some(caption).filter(|c| !c.is_empty()))
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}
