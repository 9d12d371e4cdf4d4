// Defaults for the runtime configuration, overridable from the environment (or a .env file).

use std::env;

// Use lazy_static to initialize static variables safely.
lazy_static::lazy_static! {
    pub static ref OLLAMA_URL: String = env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    pub static ref DIRECTOR_CHAT_MODEL: String = env::var("DIRECTOR_CHAT_MODEL").unwrap_or_else(|_| "llama3.1:8b".to_string());
    pub static ref DIRECTOR_VISION_MODEL: String = env::var("DIRECTOR_VISION_MODEL").unwrap_or_else(|_| "llava".to_string());
    pub static ref DIRECTOR_EMBED_MODEL: String = env::var("DIRECTOR_EMBED_MODEL").unwrap_or_else(|_| "all-minilm".to_string());
    pub static ref HF_TOKEN: String = env::var("HF_TOKEN").unwrap_or_default();
    pub static ref HF_CAPTION_URL: String = env::var("HF_CAPTION_URL").unwrap_or_else(|_| "https://api-inference.huggingface.co/models/Salesforce/blip-image-captioning-base".to_string());
    pub static ref DIRECTOR_INDEX_DIR: String = env::var("DIRECTOR_INDEX_DIR").unwrap_or_else(|_| "data/indexes".to_string());
    pub static ref DIRECTOR_CALL_TIMEOUT_SECS: String = env::var("DIRECTOR_CALL_TIMEOUT_SECS").unwrap_or_else(|_| "60".to_string());
    pub static ref DIRECTOR_CALL_RETRIES: String = env::var("DIRECTOR_CALL_RETRIES").unwrap_or_else(|_| "1".to_string());
    pub static ref DIRECTOR_TOP_K: String = env::var("DIRECTOR_TOP_K").unwrap_or_else(|_| "3".to_string());
    pub static ref DIRECTOR_UPLOAD_DIR: String = env::var("DIRECTOR_UPLOAD_DIR").unwrap_or_else(|_| env::temp_dir().join("director-uploads").to_string_lossy().into_owned());
    pub static ref DIRECTOR_SESSION_TTL_SECS: String = env::var("DIRECTOR_SESSION_TTL_SECS").unwrap_or_else(|_| "3600".to_string());
}

pub const MAX_CALL_RETRIES: u32 = 3;

pub const CHAT_TEMPERATURE: f64 = 0.2;

// Retrieval corpora, one pre-built index file each under DIRECTOR_INDEX_DIR.
pub const ENGINE_CORPUS: &str = "engine_rules";
pub const ORCHESTRATOR_CORPUS: &str = "orchestrator_master";
pub const IMAGE_CORPUS: &str = "image_master";

pub const NO_IMAGE_CAPTION: &str = "No visual reference provided yet.";
pub const FAILED_CAPTION: &str = "Image uploaded but analysis failed.";

// Reference image uploads from the web UI.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];
