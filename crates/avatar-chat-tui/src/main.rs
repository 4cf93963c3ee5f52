use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use avatar_chat_core::{Config, OllamaClient, VoicevoxClient};

mod app;
mod face;
mod handler;
mod transcript;
mod tui;
mod ui;

use app::{voice_endpoint, App};
use face::ChannelAvatar;
use tui::{EventHandler, Tui};

#[derive(Parser, Debug)]
#[command(name = "avatar-chat")]
#[command(about = "Chat with a local Ollama model while a text-mode avatar speaks the answers through VOICEVOX")]
#[command(version)]
struct Cli {
    /// Ollama model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Ollama endpoint
    #[arg(short, long)]
    endpoint: Option<String>,

    /// VOICEVOX engine endpoint
    #[arg(long)]
    voice_endpoint: Option<String>,

    /// VOICEVOX speaker style id
    #[arg(short, long)]
    speaker: Option<u32>,

    /// Start with speech output disabled
    #[arg(long)]
    no_voice: bool,

    /// List available Ollama models and exit
    #[arg(long)]
    list_models: bool,

    /// List available VOICEVOX speakers and exit
    #[arg(long)]
    list_speakers: bool,
}

impl Cli {
    /// Command-line values win over stored preferences.
    fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.chat.model = model.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.chat.endpoint = endpoint.clone();
        }
        if let Some(endpoint) = &self.voice_endpoint {
            config.voice_mut().endpoint = endpoint.clone();
        }
        if let Some(speaker) = self.speaker {
            config.voice_mut().speaker_id = Some(speaker);
        }
        if self.no_voice {
            if let Some(voice) = config.voice.as_mut() {
                voice.enabled = false;
            }
        }
    }
}

/// Logs go to a file because the terminal belongs to the UI.
fn init_logging() -> Result<PathBuf> {
    let log_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("avatar-chat");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("avatar-chat.log");

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Could not open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_path = init_logging()?;

    let config_path = Config::get_config_path()?;
    let mut config = Config::load_from(&config_path).unwrap_or_else(|e| {
        warn!("Ignoring unreadable preferences at {}: {}", config_path.display(), e);
        Config::new()
    });
    cli.apply(&mut config);

    if cli.list_models {
        return list_models(&config).await;
    }
    if cli.list_speakers {
        return list_speakers(&config).await;
    }

    info!("Starting avatar-chat, logging to {}", log_path.display());
    run(config, config_path).await
}

async fn list_models(config: &Config) -> Result<()> {
    let ollama = OllamaClient::new(&config.chat.endpoint);
    let models = ollama
        .list_models()
        .await
        .with_context(|| format!("Could not reach Ollama at {}", ollama.base_url()))?;

    if models.is_empty() {
        println!("No models found. Pull one with: ollama pull {}", config.chat.model);
    }
    for model in models {
        let marker = if model == config.chat.model { "*" } else { " " };
        println!("{} {}", marker, model);
    }
    Ok(())
}

async fn list_speakers(config: &Config) -> Result<()> {
    let voicevox = VoicevoxClient::new(&voice_endpoint(config));
    let speakers = voicevox
        .speakers()
        .await
        .with_context(|| format!("Could not reach VOICEVOX at {}", voicevox.base_url()))?;

    let selected = config.voice.as_ref().and_then(|voice| voice.speaker_id);
    for style in speakers {
        let marker = if Some(style.id) == selected { "*" } else { " " };
        println!("{} {}", marker, style.label);
    }
    Ok(())
}

async fn run(config: Config, config_path: PathBuf) -> Result<()> {
    let (face_tx, face_rx) = mpsc::unbounded_channel();
    let avatar = Arc::new(ChannelAvatar::new(face_tx));
    let load_speakers = config.voice.is_some();
    let (mut app, chat_events, speaker_events) = App::new(config, config_path, avatar);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(chat_events, face_rx, speaker_events);

    if load_speakers {
        app.refresh_speakers();
    }

    let result = event_loop(&mut terminal, &mut app, &mut events).await;

    app.stop();
    tui::restore()?;
    info!("Exiting");
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
