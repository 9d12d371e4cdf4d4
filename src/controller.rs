//! The per-turn interview state machine.
//!
//! One call to [`InterviewController::run_turn`] walks
//! `Ingest -> Evaluate -> {Ask | Synthesize -> Deliver}` and produces exactly
//! one message for the user. Collaborator failures degrade to neutral
//! defaults; nothing in a turn returns an error.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{
    resilient, CallPolicy, Captioner, EmbeddingIndexRetriever, HuggingFaceCaptioner,
    OllamaEmbedder, OllamaGenerator, OllamaVisionCaptioner, Retriever, TextGenerator,
};
use crate::config::DirectorConfig;
use crate::constants::{
    CHAT_TEMPERATURE, ENGINE_CORPUS, FAILED_CAPTION, IMAGE_CORPUS, NO_IMAGE_CAPTION,
    ORCHESTRATOR_CORPUS,
};
use crate::evaluator::{evaluate, InterviewStatus, Step};
use crate::extraction::{detects_auto_fill, extract_json, parse_extraction, Extraction};
use crate::prompts;
use crate::schema::Category;
use crate::selections::SelectionSet;
use crate::{latest_user_message, ChatMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub policy: CallPolicy,
    pub top_k: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            policy: CallPolicy::default(),
            top_k: 3,
        }
    }
}

impl From<&DirectorConfig> for ControllerSettings {
    fn from(config: &DirectorConfig) -> Self {
        Self {
            policy: CallPolicy {
                timeout: config.call_timeout,
                retries: config.call_retries,
            },
            top_k: config.top_k,
        }
    }
}

/// Where a turn ended. `Ask` and `Deliver` are the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ask,
    Deliver,
}

#[derive(Debug, Clone)]
pub struct TurnInput {
    pub history: Vec<ChatMessage>,
    pub image_path: Option<PathBuf>,
    pub selections: SelectionSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageAnalysis {
    pub caption: String,
    pub rag_context: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub selections: SelectionSet,
    pub missing: Vec<Category>,
    pub current: Step,
    pub status: InterviewStatus,
    pub phase: Phase,
    pub reply: String,
    pub image_analysis: ImageAnalysis,
    /// Fields set to "Auto" by this turn's auto-fill directive.
    pub auto_filled: Vec<String>,
    /// Structured shot sequence, only after synthesis.
    pub sequence: Option<serde_json::Value>,
}

pub struct InterviewController {
    generator: Arc<dyn TextGenerator>,
    captioners: Vec<Arc<dyn Captioner>>,
    retriever: Arc<dyn Retriever>,
    settings: ControllerSettings,
}

impl InterviewController {
    /// `captioners` are tried in order; the first usable caption wins.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        captioners: Vec<Arc<dyn Captioner>>,
        retriever: Arc<dyn Retriever>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            generator,
            captioners,
            retriever,
            settings,
        }
    }

    /// Production wiring: Ollama for text, Ollama vision then Hugging Face for
    /// captions, on-disk indexes for retrieval.
    pub fn from_config(config: &DirectorConfig) -> Self {
        let generator = OllamaGenerator::new(&config.ollama_url, &config.chat_model, CHAT_TEMPERATURE);
        let captioners: Vec<Arc<dyn Captioner>> = vec![
            Arc::new(OllamaVisionCaptioner::new(&config.ollama_url, &config.vision_model)),
            Arc::new(HuggingFaceCaptioner::new(
                &config.hf_caption_url,
                config.hf_token.clone(),
            )),
        ];
        let retriever = EmbeddingIndexRetriever::new(
            &config.index_dir,
            OllamaEmbedder::new(&config.ollama_url, &config.embed_model),
        );
        Self::new(
            Arc::new(generator),
            captioners,
            Arc::new(retriever),
            ControllerSettings::from(config),
        )
    }

    #[instrument(skip(self, input), fields(turns = input.history.len(), has_image = input.image_path.is_some()))]
    pub async fn run_turn(&self, input: TurnInput) -> TurnOutcome {
        let TurnInput {
            history,
            image_path,
            selections,
        } = input;

        // Ingest
        let image_analysis = self.ingest(image_path.as_deref()).await;
        let extraction = self.extract(&history, &selections).await;

        let mut merged = selections.merge(&extraction.selections);
        let mut auto_filled = Vec::new();
        if extraction.auto_fill || detects_auto_fill(latest_user_message(&history)) {
            auto_filled = merged
                .apply_auto_fill()
                .into_iter()
                .map(str::to_string)
                .collect();
            info!("Auto-fill directive set {} fields to Auto", auto_filled.len());
        }

        // Evaluate
        let evaluation = evaluate(&merged);
        info!(
            status = %evaluation.status,
            current = %evaluation.current,
            missing = evaluation.missing.len(),
            "Evaluated selections"
        );

        let (phase, reply, sequence) = match evaluation.current {
            Step::Ask(category) => {
                let reply = self.ask(category, &image_analysis, &merged, &history).await;
                (Phase::Ask, reply, None)
            }
            Step::Complete => {
                let sequence = self.synthesize(&merged, &image_analysis, &history).await;
                let reply = self.deliver(&sequence, &merged, &history).await;
                (Phase::Deliver, reply, Some(sequence))
            }
        };

        TurnOutcome {
            selections: merged,
            missing: evaluation.missing,
            current: evaluation.current,
            status: evaluation.status,
            phase,
            reply,
            image_analysis,
            auto_filled,
            sequence,
        }
    }

    async fn ingest(&self, image_path: Option<&Path>) -> ImageAnalysis {
        let Some(path) = image_path else {
            return no_image();
        };
        if tokio::fs::metadata(path).await.is_err() {
            warn!("Image {} does not exist, ignoring", path.display());
            return no_image();
        }

        match self.caption(path).await {
            Some(caption) => {
                let rag_context = self.retrieve(IMAGE_CORPUS, &caption).await;
                ImageAnalysis {
                    caption,
                    rag_context,
                }
            }
            None => ImageAnalysis {
                caption: FAILED_CAPTION.to_string(),
                rag_context: String::new(),
            },
        }
    }

    async fn caption(&self, path: &Path) -> Option<String> {
        for captioner in &self.captioners {
            let name = captioner.name().to_string();
            match resilient(&name, self.settings.policy, || captioner.caption(path)).await {
                Ok(Some(caption)) if !caption.trim().is_empty() => {
                    debug!(captioner = %name, %caption, "Captioned image");
                    return Some(caption);
                }
                Ok(_) => debug!("Captioner {} produced nothing, trying next", name),
                Err(e) => warn!("Captioner {} failed: {}", name, e),
            }
        }
        None
    }

    async fn retrieve(&self, corpus_id: &str, query: &str) -> String {
        let top_k = self.settings.top_k;
        match resilient("retrieval", self.settings.policy, || {
            self.retriever.search(corpus_id, query, top_k)
        })
        .await
        {
            Ok(context) => context,
            Err(e) => {
                warn!("Retrieval from {} failed, continuing without context: {}", corpus_id, e);
                String::new()
            }
        }
    }

    /// Calls the text generator; `None` on failure or an empty reply.
    async fn generate(&self, operation: &str, prompt: &str, history: &[ChatMessage]) -> Option<String> {
        debug!(%operation, %prompt, "Generating");
        match resilient(operation, self.settings.policy, || {
            self.generator.generate(prompt, history)
        })
        .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                warn!("{} returned an empty reply", operation);
                None
            }
            Err(e) => {
                warn!("{} failed: {}", operation, e);
                None
            }
        }
    }

    async fn extract(&self, history: &[ChatMessage], selections: &SelectionSet) -> Extraction {
        let user_text = latest_user_message(history);
        let rules = self.retrieve(ENGINE_CORPUS, user_text).await;
        let prompt = prompts::analyst_prompt(user_text, selections, &rules);

        let Some(reply) = self.generate("extraction", &prompt, history).await else {
            return Extraction::default();
        };
        let extraction = parse_extraction(&reply);
        if extraction.selections.is_empty() && !extraction.auto_fill {
            debug!("Extraction yielded no fields this turn");
        }
        extraction
    }

    async fn ask(
        &self,
        category: Category,
        image: &ImageAnalysis,
        selections: &SelectionSet,
        history: &[ChatMessage],
    ) -> String {
        let prompt = prompts::interviewer_prompt(category, &image.caption, selections);
        match self.generate("question", &prompt, history).await {
            Some(question) => question,
            None => fallback_question(category),
        }
    }

    async fn synthesize(
        &self,
        selections: &SelectionSet,
        image: &ImageAnalysis,
        history: &[ChatMessage],
    ) -> serde_json::Value {
        let selections_text = serde_json::to_string(selections).unwrap_or_default();
        let master = self.retrieve(ORCHESTRATOR_CORPUS, &selections_text).await;
        let prompt = prompts::orchestrator_prompt(selections, &image.caption, &master);

        match self.generate("synthesis", &prompt, history).await {
            Some(reply) => extract_json(&reply),
            None => serde_json::json!({}),
        }
    }

    async fn deliver(
        &self,
        sequence: &serde_json::Value,
        selections: &SelectionSet,
        history: &[ChatMessage],
    ) -> String {
        let prompt = prompts::delivery_prompt(sequence);
        match self.generate("delivery", &prompt, history).await {
            Some(package) => package,
            None => fallback_package(sequence, selections),
        }
    }
}

fn no_image() -> ImageAnalysis {
    ImageAnalysis {
        caption: NO_IMAGE_CAPTION.to_string(),
        rag_context: String::new(),
    }
}

/// Question used when the text generator cannot phrase one.
pub fn fallback_question(category: Category) -> String {
    let mut question = format!("Let's lock in the {}.\n", category.title());
    for field in category.fields() {
        question.push_str(&format!("- {} ({})\n", field.question, field.options.join(", ")));
    }
    question.push_str("If you're unsure, just say: Let Jhonny Decide.");
    question
}

/// Final package used when the text generator cannot write one.
pub fn fallback_package(sequence: &serde_json::Value, selections: &SelectionSet) -> String {
    let has_sequence = sequence.as_object().is_some_and(|o| !o.is_empty());
    let manifest = if has_sequence {
        serde_json::to_string_pretty(sequence)
    } else {
        serde_json::to_string_pretty(selections)
    }
    .unwrap_or_else(|_| "{}".to_string());
    format!(
        "## Final Package\n\nThe brief is complete. Technical manifest:\n\n```json\n{}\n```",
        manifest
    )
}
