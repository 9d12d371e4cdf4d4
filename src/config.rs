use std::path::PathBuf;
use std::time::Duration;

use crate::constants;
use crate::error::ConfigError;

/// Raw, unvalidated settings as read from the environment.
#[derive(Debug, Clone)]
pub struct ConfigValues {
    pub ollama_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub embed_model: String,
    pub hf_token: String,
    pub hf_caption_url: String,
    pub index_dir: String,
    pub call_timeout_secs: String,
    pub call_retries: String,
    pub top_k: String,
    pub upload_dir: String,
    pub session_ttl_secs: String,
}

impl ConfigValues {
    pub fn from_env() -> Self {
        Self {
            ollama_url: constants::OLLAMA_URL.clone(),
            chat_model: constants::DIRECTOR_CHAT_MODEL.clone(),
            vision_model: constants::DIRECTOR_VISION_MODEL.clone(),
            embed_model: constants::DIRECTOR_EMBED_MODEL.clone(),
            hf_token: constants::HF_TOKEN.clone(),
            hf_caption_url: constants::HF_CAPTION_URL.clone(),
            index_dir: constants::DIRECTOR_INDEX_DIR.clone(),
            call_timeout_secs: constants::DIRECTOR_CALL_TIMEOUT_SECS.clone(),
            call_retries: constants::DIRECTOR_CALL_RETRIES.clone(),
            top_k: constants::DIRECTOR_TOP_K.clone(),
            upload_dir: constants::DIRECTOR_UPLOAD_DIR.clone(),
            session_ttl_secs: constants::DIRECTOR_SESSION_TTL_SECS.clone(),
        }
    }
}

/// Validated service configuration. Built once at startup; an invalid value is fatal.
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    pub ollama_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub embed_model: String,
    /// Hugging Face token for the fallback captioner. `None` disables it.
    pub hf_token: Option<String>,
    pub hf_caption_url: String,
    pub index_dir: PathBuf,
    pub call_timeout: Duration,
    pub call_retries: u32,
    pub top_k: usize,
    /// Where uploaded reference images are stored, one file per session.
    pub upload_dir: PathBuf,
    /// Sessions idle for longer than this are dropped.
    pub session_ttl: Duration,
}

impl DirectorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_values(ConfigValues::from_env())
    }

    pub fn from_values(values: ConfigValues) -> Result<Self, ConfigError> {
        let ollama_url = non_empty("OLLAMA_URL", values.ollama_url)?;
        if !(ollama_url.starts_with("http://") || ollama_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "OLLAMA_URL",
                value: ollama_url,
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let call_timeout_secs: u64 = parse_number("DIRECTOR_CALL_TIMEOUT_SECS", &values.call_timeout_secs)?;
        if call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "DIRECTOR_CALL_TIMEOUT_SECS",
                value: values.call_timeout_secs,
                reason: "must be at least 1".to_string(),
            });
        }

        let call_retries: u32 = parse_number("DIRECTOR_CALL_RETRIES", &values.call_retries)?;
        if call_retries > constants::MAX_CALL_RETRIES {
            return Err(ConfigError::Invalid {
                key: "DIRECTOR_CALL_RETRIES",
                value: values.call_retries,
                reason: format!("must be at most {}", constants::MAX_CALL_RETRIES),
            });
        }

        let session_ttl_secs: u64 = parse_number("DIRECTOR_SESSION_TTL_SECS", &values.session_ttl_secs)?;
        if session_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "DIRECTOR_SESSION_TTL_SECS",
                value: values.session_ttl_secs,
                reason: "must be at least 1".to_string(),
            });
        }

        let hf_token = Some(values.hf_token.trim().to_string()).filter(|t| !t.is_empty());

        Ok(Self {
            ollama_url: ollama_url.trim_end_matches('/').to_string(),
            chat_model: non_empty("DIRECTOR_CHAT_MODEL", values.chat_model)?,
            vision_model: non_empty("DIRECTOR_VISION_MODEL", values.vision_model)?,
            embed_model: non_empty("DIRECTOR_EMBED_MODEL", values.embed_model)?,
            hf_token,
            hf_caption_url: non_empty("HF_CAPTION_URL", values.hf_caption_url)?,
            index_dir: PathBuf::from(non_empty("DIRECTOR_INDEX_DIR", values.index_dir)?),
            call_timeout: Duration::from_secs(call_timeout_secs),
            call_retries,
            top_k: parse_number("DIRECTOR_TOP_K", &values.top_k)?,
            upload_dir: PathBuf::from(non_empty("DIRECTOR_UPLOAD_DIR", values.upload_dir)?),
            session_ttl: Duration::from_secs(session_ttl_secs),
        })
    }
}

fn non_empty(key: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Empty { key });
    }
    Ok(trimmed.to_string())
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> ConfigValues {
        ConfigValues {
            ollama_url: "http://localhost:11434/".to_string(),
            chat_model: "llama3.1:8b".to_string(),
            vision_model: "llava".to_string(),
            embed_model: "all-minilm".to_string(),
            hf_token: String::new(),
            hf_caption_url: "https://example.invalid/blip".to_string(),
            index_dir: "data/indexes".to_string(),
            call_timeout_secs: "30".to_string(),
            call_retries: "1".to_string(),
            top_k: "3".to_string(),
            upload_dir: "/tmp/director-uploads".to_string(),
            session_ttl_secs: "600".to_string(),
        }
    }

    #[test]
    fn test_valid_values() {
        let config = DirectorConfig::from_values(values()).unwrap();
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.call_retries, 1);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.session_ttl, Duration::from_secs(600));
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/director-uploads"));
        assert!(config.hf_token.is_none());
    }

    #[test]
    fn test_hf_token_kept_when_set() {
        let mut raw = values();
        raw.hf_token = " hf_abc ".to_string();
        let config = DirectorConfig::from_values(raw).unwrap();
        assert_eq!(config.hf_token.as_deref(), Some("hf_abc"));
    }

    #[test]
    fn test_empty_model_is_fatal() {
        let mut raw = values();
        raw.chat_model = "  ".to_string();
        assert_eq!(
            DirectorConfig::from_values(raw).unwrap_err(),
            ConfigError::Empty { key: "DIRECTOR_CHAT_MODEL" }
        );
    }

    #[test]
    fn test_bad_url_is_fatal() {
        let mut raw = values();
        raw.ollama_url = "localhost:11434".to_string();
        assert!(matches!(
            DirectorConfig::from_values(raw),
            Err(ConfigError::Invalid { key: "OLLAMA_URL", .. })
        ));
    }

    #[test]
    fn test_bad_numbers_are_fatal() {
        let mut raw = values();
        raw.top_k = "three".to_string();
        assert!(matches!(
            DirectorConfig::from_values(raw),
            Err(ConfigError::Invalid { key: "DIRECTOR_TOP_K", .. })
        ));

        let mut raw = values();
        raw.call_timeout_secs = "0".to_string();
        assert!(matches!(
            DirectorConfig::from_values(raw),
            Err(ConfigError::Invalid { key: "DIRECTOR_CALL_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn test_retries_are_bounded() {
        let mut raw = values();
        raw.call_retries = "3".to_string();
        assert_eq!(DirectorConfig::from_values(raw).unwrap().call_retries, 3);

        let mut raw = values();
        raw.call_retries = "4".to_string();
        assert!(matches!(
            DirectorConfig::from_values(raw),
            Err(ConfigError::Invalid { key: "DIRECTOR_CALL_RETRIES", .. })
        ));

        let mut raw = values();
        raw.call_retries = "4294967295".to_string();
        assert!(DirectorConfig::from_values(raw).is_err());
    }

    #[test]
    fn test_zero_session_ttl_is_fatal() {
        let mut raw = values();
        raw.session_ttl_secs = "0".to_string();
        assert!(matches!(
            DirectorConfig::from_values(raw),
            Err(ConfigError::Invalid { key: "DIRECTOR_SESSION_TTL_SECS", .. })
        ));
    }
}
