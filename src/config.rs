use std::env;
use std::path::PathBuf;

use crate::errors::EngineError;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "你是一名专业电商客服助手，请用友好、专业的态度回答用户问题。";

/// Runtime configuration for the engine.
///
/// All fields are public so embedding processes and tests can build a
/// `Settings` directly; `from_env` is the production path.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub knowledge_dir: PathBuf,
    pub system_prompt: String,
    pub max_segment_chars: usize,
    pub embed_batch_size: usize,
    pub retrieve_top_k: usize,
    pub history_window: usize,
    pub session_ttl_secs: u64,
    pub embed_timeout_secs: u64,
    pub chat_timeout_secs: u64,
    pub eval_timeout_secs: u64,
    pub stream_timeout_secs: u64,
}

impl Settings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Settings {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            knowledge_dir: PathBuf::from("knowledge_data"),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_segment_chars: 500,
            embed_batch_size: 50,
            retrieve_top_k: 3,
            history_window: 5,
            session_ttl_secs: 3600,
            embed_timeout_secs: 15,
            chat_timeout_secs: 20,
            eval_timeout_secs: 15,
            stream_timeout_secs: 30,
        }
    }

    /// Build settings from the process environment, loading `.env` first.
    ///
    /// `DEEPSEEK_API_KEY` is the only required variable; everything else
    /// falls back to the defaults above.
    pub fn from_env() -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();

        let api_key = env::var("DEEPSEEK_API_KEY")
            .map_err(|_| EngineError::Config("DEEPSEEK_API_KEY is not set".to_string()))?;

        let mut settings = Settings::new(api_key);

        if let Ok(url) = env::var("DEEPSEEK_BASE_URL") {
            settings.base_url = url;
        }
        if let Ok(model) = env::var("DEEPSEEK_CHAT_MODEL") {
            settings.chat_model = model;
        }
        if let Ok(model) = env::var("DEEPSEEK_EMBEDDING_MODEL") {
            settings.embedding_model = model;
        }
        if let Ok(dir) = env::var("KNOWLEDGE_DIR") {
            settings.knowledge_dir = PathBuf::from(dir);
        }
        if let Ok(prompt) = env::var("SYSTEM_PROMPT") {
            settings.system_prompt = prompt;
        }

        settings.max_segment_chars =
            parse_var("MAX_SEGMENT_CHARS", settings.max_segment_chars)?.max(1);
        settings.embed_batch_size =
            parse_var("EMBED_BATCH_SIZE", settings.embed_batch_size)?.max(1);
        settings.retrieve_top_k = parse_var("RETRIEVE_TOP_K", settings.retrieve_top_k)?.max(1);
        settings.history_window = parse_var("HISTORY_WINDOW", settings.history_window)?;
        settings.session_ttl_secs = parse_var("SESSION_TTL_SECS", settings.session_ttl_secs)?.max(1);

        Ok(settings)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, EngineError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EngineError::Config(format!("{} must be an integer, got '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_tunables() {
        let settings = Settings::new("test-key");
        assert_eq!(settings.base_url, "https://api.deepseek.com/v1");
        assert_eq!(settings.chat_model, "deepseek-chat");
        assert_eq!(settings.embedding_model, "text-embedding");
        assert_eq!(settings.max_segment_chars, 500);
        assert_eq!(settings.embed_batch_size, 50);
        assert_eq!(settings.retrieve_top_k, 3);
        assert_eq!(settings.history_window, 5);
        assert_eq!(settings.session_ttl_secs, 3600);
        assert_eq!(settings.chat_timeout_secs, 20);
        assert_eq!(settings.stream_timeout_secs, 30);
    }

    #[test]
    fn system_prompt_defaults_to_customer_service_persona() {
        let settings = Settings::new("test-key");
        assert!(settings.system_prompt.contains("电商客服"));
    }
}
