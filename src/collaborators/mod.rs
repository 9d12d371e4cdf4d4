//! Narrow interfaces to the external services the interview depends on.
//!
//! The controller receives these as trait objects, so tests substitute fakes
//! and production wires in the Ollama / Hugging Face / on-disk index clients.

pub mod caption;
pub mod ollama;
pub mod retrieval;

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::CollaboratorError;
use crate::ChatMessage;

pub use caption::{HuggingFaceCaptioner, OllamaVisionCaptioner};
pub use ollama::OllamaGenerator;
pub use retrieval::{EmbeddingIndexRetriever, OllamaEmbedder};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates a reply for `history` under `system_prompt`.
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait Captioner: Send + Sync {
    /// Describes the image at `image_path`. `Ok(None)` means this captioner is unavailable.
    async fn caption(&self, image_path: &Path) -> Result<Option<String>, CollaboratorError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns the `top_k` most similar documents of `corpus_id`, joined by newlines.
    async fn search(
        &self,
        corpus_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<String, CollaboratorError>;
}

/// Timeout and retry budget applied around every collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retries: 1,
        }
    }
}

/// Runs `call` under the policy's timeout, retrying transient failures up to
/// `policy.retries` extra times with a short exponential backoff.
pub async fn resilient<T, F, Fut>(
    operation: &str,
    policy: CallPolicy,
    mut call: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout {
                operation: operation.to_string(),
                timeout_ms: policy.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.retries => {
                let delay_ms = 200u64 * (1u64 << attempt.min(5));
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {}ms",
                    operation,
                    attempt + 1,
                    policy.retries + 1,
                    e,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
