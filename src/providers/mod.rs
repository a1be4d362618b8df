//! Provider back ends and the registry that selects between them.
//!
//! Every back end implements [`ChatClient`] and normalizes its wire format
//! into [`StreamEvent`]s, so the chat loop never sees provider-specific
//! response shapes.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::stream::StreamEvent;
use crate::transcript::Transcript;

pub mod claude;
pub mod ollama;
pub mod openai;

use claude::ClaudeClient;
use ollama::OllamaClient;
use openai::OpenAiCompatClient;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Mistral,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Mistral => "mistral",
            Provider::Ollama => "ollama",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "anthropic" | "claude" => Some(Provider::Anthropic),
            "mistral" => Some(Provider::Mistral),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![
            Provider::OpenAi,
            Provider::Anthropic,
            Provider::Mistral,
            Provider::Ollama,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Mistral => "Mistral",
            Provider::Ollama => "Ollama (Local)",
        }
    }

    /// Model used when neither the CLI nor the config file names one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::Mistral => "mistral-small-latest",
            Provider::Ollama => "llama3.2:latest",
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Mistral => Some("MISTRAL_API_KEY"),
            Provider::Ollama => None,
        }
    }
}

/// Capability interface for one chat completion back end.
///
/// The model is fixed at construction time; callers hand over the transcript
/// and get either a channel of normalized events or the full response body.
#[async_trait]
pub trait ChatClient: std::fmt::Debug + Send + Sync {
    /// Start a streaming completion. Events arrive on the returned channel
    /// in provider order; the channel closes when the response ends.
    async fn send_streaming(&self, transcript: &Transcript) -> Result<mpsc::Receiver<StreamEvent>>;

    /// Blocking completion returning the full response text.
    async fn send(&self, transcript: &Transcript) -> Result<String>;
}

/// Construct the back end selected by the resolved settings, checking
/// credentials up front so misconfiguration fails before the loop starts.
pub fn build_client(settings: &Settings) -> Result<Arc<dyn ChatClient>> {
    let model = settings.model.clone();

    match settings.provider {
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(&settings.ollama_url, model))),
        provider => {
            let Some(api_key) = settings.api_key.clone() else {
                // Safe unwrap: every non-Ollama provider declares a key env var.
                let env = provider.api_key_env().unwrap_or("API_KEY");
                bail!(
                    "No API key for {}: set the {env} environment variable or pass --api-key",
                    provider.display_name()
                );
            };
            match provider {
                Provider::OpenAi => Ok(Arc::new(OpenAiCompatClient::new(
                    OPENAI_BASE_URL,
                    "OpenAI",
                    api_key,
                    model,
                ))),
                Provider::Mistral => Ok(Arc::new(OpenAiCompatClient::new(
                    MISTRAL_BASE_URL,
                    "Mistral",
                    api_key,
                    model,
                ))),
                Provider::Anthropic => Ok(Arc::new(ClaudeClient::new(api_key, model))),
                Provider::Ollama => unreachable!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_OLLAMA_URL;

    fn settings_for(provider: Provider, api_key: Option<&str>) -> Settings {
        Settings {
            provider,
            model: provider.default_model().to_string(),
            system_message: None,
            api_key: api_key.map(str::to_string),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            stream: true,
            panel: true,
            width: 0,
            avatar: "🧑".to_string(),
        }
    }

    #[test]
    fn test_provider_round_trips_through_names() {
        for provider in Provider::all() {
            assert_eq!(Provider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(Provider::from_str("Claude"), Some(Provider::Anthropic));
        assert_eq!(Provider::from_str("bard"), None);
    }

    #[test]
    fn test_every_remote_provider_declares_key_env() {
        for provider in Provider::all() {
            if provider != Provider::Ollama {
                assert!(provider.api_key_env().is_some());
            }
        }
        assert_eq!(Provider::Ollama.api_key_env(), None);
    }

    #[test]
    fn test_build_client_requires_key_for_remote_providers() {
        let err = build_client(&settings_for(Provider::OpenAi, None)).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = build_client(&settings_for(Provider::Mistral, None)).unwrap_err();
        assert!(err.to_string().contains("MISTRAL_API_KEY"));
    }

    #[test]
    fn test_build_client_accepts_ollama_without_key() {
        assert!(build_client(&settings_for(Provider::Ollama, None)).is_ok());
        assert!(build_client(&settings_for(Provider::Anthropic, Some("sk-ant"))).is_ok());
    }
}
