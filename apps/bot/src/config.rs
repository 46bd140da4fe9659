use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::models::Language;

const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v22.0";

/// How rating prompts are rendered on the messaging channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RatingPromptMode {
    /// Plain text; the user replies with a bare number.
    #[default]
    Text,
    /// Interactive list message with one row per score.
    List,
    /// WhatsApp Flow screen.
    Flow,
}

impl RatingPromptMode {
    /// List and flow prompts are answered through structured replies.
    pub fn is_structured(self) -> bool {
        !matches!(self, RatingPromptMode::Text)
    }
}

impl FromStr for RatingPromptMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(RatingPromptMode::Text),
            "list" => Ok(RatingPromptMode::List),
            "flow" => Ok(RatingPromptMode::Flow),
            other => bail!("unknown rating prompt mode '{other}' (expected text, list or flow)"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub phone_number_id: String,
    pub access_token: String,
    pub verify_token: String,
    pub openai_api_key: String,
    pub database_url: Option<String>,
    pub trust_check_interval: u32,
    pub rating_prompt_mode: RatingPromptMode,
    pub flow_id: Option<String>,
    pub default_language: Language,
    pub prompt_dir: PathBuf,
    pub whatsapp_api_base: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            get(key)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let trust_check_interval = get("TRUST_CHECK_INTERVAL")
            .unwrap_or_else(|| "3".to_string())
            .parse::<u32>()
            .context("TRUST_CHECK_INTERVAL must be a positive integer")?;
        if trust_check_interval == 0 {
            bail!("TRUST_CHECK_INTERVAL must be at least 1");
        }

        let use_flows = get("USE_FLOWS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let rating_prompt_mode = if use_flows {
            RatingPromptMode::Flow
        } else {
            get("RATING_PROMPT_MODE")
                .map(|v| v.parse::<RatingPromptMode>())
                .transpose()
                .context("RATING_PROMPT_MODE is invalid")?
                .unwrap_or_default()
        };

        let flow_id = get("FLOW_ID").filter(|v| !v.is_empty());
        if rating_prompt_mode == RatingPromptMode::Flow && flow_id.is_none() {
            bail!("FLOW_ID must be set when rating prompts are sent as flows");
        }

        let default_language = get("DEFAULT_LANGUAGE")
            .map(|v| v.parse::<Language>())
            .transpose()
            .map_err(anyhow::Error::msg)
            .context("DEFAULT_LANGUAGE is invalid")?
            .unwrap_or_default();

        Ok(Config {
            phone_number_id: require("PHONE_NUMBER_ID")?,
            access_token: require("ACCESS_TOKEN")?,
            verify_token: require("VERIFY_TOKEN")?,
            openai_api_key: require("OPENAI_API_KEY")?,
            database_url: get("DATABASE_URL").filter(|v| !v.is_empty()),
            trust_check_interval,
            rating_prompt_mode,
            flow_id,
            default_language,
            prompt_dir: get("PROMPT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("prompts")),
            whatsapp_api_base: get("WHATSAPP_API_BASE")
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            port: get("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("PHONE_NUMBER_ID", "1234".to_string()),
            ("ACCESS_TOKEN", "token".to_string()),
            ("VERIFY_TOKEN", "verify".to_string()),
            ("OPENAI_API_KEY", "sk-test".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<Config> {
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.trust_check_interval, 3);
        assert_eq!(config.rating_prompt_mode, RatingPromptMode::Text);
        assert_eq!(config.default_language, Language::En);
        assert_eq!(config.port, 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.whatsapp_api_base, DEFAULT_WHATSAPP_API_BASE);
    }

    #[test]
    fn test_missing_required_variable_is_named() {
        let mut env = base_env();
        env.remove("VERIFY_TOKEN");
        let err = load(&env).unwrap_err();
        assert!(err.to_string().contains("VERIFY_TOKEN"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut env = base_env();
        env.insert("TRUST_CHECK_INTERVAL", "0".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn test_use_flows_requires_flow_id() {
        let mut env = base_env();
        env.insert("USE_FLOWS", "true".to_string());
        assert!(load(&env).is_err());

        env.insert("FLOW_ID", "987".to_string());
        let config = load(&env).unwrap();
        assert_eq!(config.rating_prompt_mode, RatingPromptMode::Flow);
    }

    #[test]
    fn test_list_mode_and_language() {
        let mut env = base_env();
        env.insert("RATING_PROMPT_MODE", "List".to_string());
        env.insert("DEFAULT_LANGUAGE", "pt".to_string());
        let config = load(&env).unwrap();
        assert_eq!(config.rating_prompt_mode, RatingPromptMode::List);
        assert!(config.rating_prompt_mode.is_structured());
        assert_eq!(config.default_language, Language::Pt);
    }
}
