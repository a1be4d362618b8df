use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod config;
mod handler;
mod history;
mod providers;
mod stream;
mod transcript;
mod tui;
mod ui;

use app::App;
use config::{Config, Settings, DEFAULT_OLLAMA_URL};
use history::PromptHistory;
use providers::Provider;

#[derive(Parser)]
#[command(name = "llm-term", version)]
#[command(about = "Chat with OpenAI, Anthropic, Mistral, or Ollama models from your terminal")]
struct Cli {
    /// Chat provider: openai, anthropic, mistral, or ollama
    #[arg(short, long)]
    provider: Option<String>,

    /// Model name (defaults to the provider's default model)
    #[arg(short, long)]
    model: Option<String>,

    /// Override the system message
    #[arg(short, long)]
    system: Option<String>,

    /// API key (defaults to the provider's environment variable)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Wait for the complete response instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// Render the chat without a bordered panel (cleaner copy-paste)
    #[arg(long)]
    plain: bool,

    /// Chat pane width in columns (0 = full terminal width)
    #[arg(short, long, default_value_t = 0)]
    width: u16,

    /// Avatar shown next to your messages
    #[arg(short, long, default_value = "🧑")]
    avatar: String,

    /// Initial chat message, sent as the first turn
    message: Option<String>,
}

/// Merge CLI flags over environment variables over the config file.
fn resolve_settings(cli: &Cli, config: &Config) -> Result<Settings> {
    let provider_name = cli
        .provider
        .clone()
        .or_else(|| config.provider.clone())
        .unwrap_or_else(|| "openai".to_string());
    let provider = Provider::from_str(&provider_name).ok_or_else(|| {
        anyhow!("Unsupported provider '{provider_name}' (expected openai, anthropic, mistral, or ollama)")
    })?;

    let model = cli
        .model
        .clone()
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| provider.default_model().to_string());

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| {
            provider
                .api_key_env()
                .and_then(|env| std::env::var(env).ok())
                .filter(|key| !key.is_empty())
        })
        .or_else(|| config.api_key_for(provider).map(str::to_string));

    let ollama_url = config
        .ollama_url
        .clone()
        .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

    Ok(Settings {
        provider,
        model,
        system_message: cli.system.clone(),
        api_key,
        ollama_url,
        stream: !cli.no_stream,
        panel: !cli.plain,
        width: cli.width,
        avatar: cli.avatar.clone(),
    })
}

/// The TUI owns stderr, so logging goes to a file, and only when asked for.
fn init_tracing() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        return Ok(());
    }

    let log_dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join("llm-term");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("llm-term.log"))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    // Configuration and credential problems fail with a non-zero exit
    // before the terminal is touched
    let config = Config::load()?;
    let settings = resolve_settings(&cli, &config)?;
    let client = providers::build_client(&settings)?;
    let history = PromptHistory::load(PromptHistory::default_path()?)?;

    let mut app = App::new(&settings, client, history);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app, cli.message).await;
    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, initial_message: Option<String>) -> Result<()> {
    let mut events = tui::EventHandler::new(tui::tick_interval());

    // The command-line message is consumed exactly once
    if let Some(message) = initial_message {
        app.submit(&message).await?;
    }

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("llm-term").chain(args.iter().copied()))
    }

    #[test]
    fn test_provider_flag_overrides_config() {
        let config = Config {
            provider: Some("openai".to_string()),
            ..Config::default()
        };
        let settings = resolve_settings(&cli(&["--provider", "ollama"]), &config).unwrap();
        assert_eq!(settings.provider, Provider::Ollama);
    }

    #[test]
    fn test_unknown_provider_is_a_config_error() {
        let err = resolve_settings(&cli(&["--provider", "bard"]), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("bard"));
    }

    #[test]
    fn test_model_defaults_follow_provider() {
        let settings = resolve_settings(&cli(&["-p", "anthropic"]), &Config::default()).unwrap();
        assert_eq!(settings.model, Provider::Anthropic.default_model());

        let settings =
            resolve_settings(&cli(&["-p", "anthropic", "-m", "claude-3-opus-20240229"]), &Config::default())
                .unwrap();
        assert_eq!(settings.model, "claude-3-opus-20240229");
    }

    #[test]
    fn test_api_key_flag_beats_config() {
        let config = Config {
            openai_api_key: Some("sk-from-config".to_string()),
            ..Config::default()
        };
        let settings = resolve_settings(&cli(&["-p", "openai", "-k", "sk-flag"]), &config).unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("sk-flag"));

        let settings = resolve_settings(&cli(&["-p", "openai"]), &config).unwrap();
        // Falls back to the config file (the env var is unset in tests)
        assert_eq!(settings.api_key.as_deref(), Some("sk-from-config"));
    }

    #[test]
    fn test_stream_and_panel_flags_invert() {
        let settings = resolve_settings(&cli(&[]), &Config::default()).unwrap();
        assert!(settings.stream);
        assert!(settings.panel);

        let settings =
            resolve_settings(&cli(&["--no-stream", "--plain"]), &Config::default()).unwrap();
        assert!(!settings.stream);
        assert!(!settings.panel);
    }

    #[test]
    fn test_initial_message_is_positional() {
        let parsed = cli(&["-p", "ollama", "explain lifetimes"]);
        assert_eq!(parsed.message.as_deref(), Some("explain lifetimes"));
    }
}
