use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::providers::Provider;

/// Persisted configuration, read from `<config_dir>/llm-term/config.json`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub ollama_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("llm-term").join("config.json"))
    }

    /// Stored API key for the given provider, if any.
    pub fn api_key_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::Mistral => self.mistral_api_key.as_deref(),
            Provider::Ollama => None,
        }
    }
}

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Fully resolved session settings: CLI flags merged over environment
/// variables merged over the config file. Passed by value into client
/// construction so no credential state lives in globals.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    pub model: String,
    pub system_message: Option<String>,
    pub api_key: Option<String>,
    pub ollama_url: String,
    pub stream: bool,
    pub panel: bool,
    pub width: u16,
    pub avatar: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses_partial_json() {
        let config: Config =
            serde_json::from_str(r#"{"provider": "ollama", "default_model": "llama3.2:latest"}"#)
                .unwrap();
        assert_eq!(config.provider.as_deref(), Some("ollama"));
        assert_eq!(config.default_model.as_deref(), Some("llama3.2:latest"));
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_api_key_lookup_per_provider() {
        let config = Config {
            openai_api_key: Some("sk-openai".to_string()),
            mistral_api_key: Some("sk-mistral".to_string()),
            ..Config::default()
        };
        assert_eq!(config.api_key_for(Provider::OpenAi), Some("sk-openai"));
        assert_eq!(config.api_key_for(Provider::Mistral), Some("sk-mistral"));
        assert_eq!(config.api_key_for(Provider::Anthropic), None);
        assert_eq!(config.api_key_for(Provider::Ollama), None);
    }
}
