use std::path::PathBuf;
use std::sync::Arc;

use avatar_chat_core::{
    Avatar, ChatRole, ChatSession, Config, ExchangeState, OllamaClient, PersonaPrefs,
    PersonaPreset, RodioPlayer, SpeakerStyle, SpeechError, SpeechQueue, StreamEvent, StreamEvents,
    VoicevoxClient, config::DEFAULT_VOICE_ENDPOINT,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::face::Face;
use crate::transcript::ChatLog;

pub const GREETING: &str = "こんにちは！何かお話しますか？";

/// Whether the speech queue would actually speak, and why not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    NotConfigured,
    Off,
    NoSpeaker,
    On,
}

/// Outcome of a background speaker list fetch
#[derive(Debug)]
pub struct SpeakersLoaded {
    pub endpoint: String,
    pub result: Result<Vec<SpeakerStyle>, SpeechError>,
}

pub type SpeakerEvents = mpsc::UnboundedReceiver<SpeakersLoaded>;

pub struct App {
    pub should_quit: bool,

    // Input line
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // Transcript
    pub log: ChatLog,
    pub chat_scroll: u16,
    pub follow_tail: bool,
    pub chat_height: u16, // inner height of the transcript pane, set during render

    // Avatar
    pub face: Face,

    // Status line message, replaced by the next action
    pub status: Option<String>,

    // Voice
    pub speakers: Vec<SpeakerStyle>,
    speakers_tx: mpsc::UnboundedSender<SpeakersLoaded>,

    // Data
    pub session: ChatSession,
    pub config: Config,
    config_path: PathBuf,
}

impl App {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        avatar: Arc<dyn Avatar>,
    ) -> (Self, StreamEvents, SpeakerEvents) {
        let ollama = OllamaClient::new(&config.chat.endpoint);
        let voicevox = VoicevoxClient::new(&voice_endpoint(&config));

        let speech = SpeechQueue::new(
            config.voice.clone(),
            Arc::new(voicevox),
            Arc::new(RodioPlayer::new()),
            Arc::clone(&avatar),
        );
        let (session, events) = ChatSession::new(
            Arc::new(ollama),
            &config.chat.model,
            &config.system_prompt(),
            speech,
            avatar,
        );

        let (speakers_tx, speaker_events) = mpsc::unbounded_channel();

        let mut log = ChatLog::new();
        log.push_complete(ChatRole::Assistant, GREETING);

        let app = Self {
            should_quit: false,
            input: String::new(),
            input_cursor: 0,
            log,
            chat_scroll: 0,
            follow_tail: true,
            chat_height: 0,
            face: Face::default(),
            status: None,
            speakers: Vec::new(),
            speakers_tx,
            session,
            config,
            config_path,
        };
        (app, events, speaker_events)
    }

    pub fn is_busy(&self) -> bool {
        self.session.state() != ExchangeState::Idle
    }

    pub fn voice_status(&self) -> VoiceStatus {
        match &self.config.voice {
            None => VoiceStatus::NotConfigured,
            Some(voice) if !voice.enabled => VoiceStatus::Off,
            Some(voice) if voice.speaker_id.is_none() => VoiceStatus::NoSpeaker,
            Some(_) => VoiceStatus::On,
        }
    }

    /// Label of the selected speaker, falling back to its id.
    pub fn speaker_label(&self) -> Option<String> {
        let id = self.config.voice.as_ref()?.speaker_id?;
        let label = self
            .speakers
            .iter()
            .find(|style| style.id == id)
            .map(|style| style.label.clone())
            .unwrap_or_else(|| format!("[{}]", id));
        Some(label)
    }

    pub fn persona(&self) -> Option<PersonaPreset> {
        self.config.persona.as_ref().and_then(PersonaPrefs::preset)
    }

    pub fn submit_input(&mut self) {
        let text = std::mem::take(&mut self.input);
        self.input_cursor = 0;
        if text.trim().is_empty() {
            return;
        }

        match self.session.submit(&text, &mut self.log) {
            Ok(()) => {
                self.status = None;
                self.follow_tail = true;
            }
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    /// Stops the answer in flight and any speech.
    pub fn stop(&mut self) {
        self.session.stop(&mut self.log);
    }

    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        self.session.handle(event, &mut self.log);
    }

    pub fn toggle_voice(&mut self) {
        let voice = self.config.voice_mut();
        voice.enabled = !voice.enabled;
        let enabled = voice.enabled;
        self.session.speech().update_settings(self.config.voice.clone());

        self.status = Some(match (enabled, self.voice_status()) {
            (false, _) => "Voice off".to_string(),
            (true, VoiceStatus::NoSpeaker) => "Voice on, no speaker selected (Ctrl+R to load)".to_string(),
            (true, _) => "Voice on".to_string(),
        });
        self.save_config();
    }

    pub fn cycle_speaker(&mut self) {
        if self.speakers.is_empty() {
            self.status = Some("No speakers loaded (Ctrl+R to load)".to_string());
            return;
        }

        let current = self.config.voice.as_ref().and_then(|voice| voice.speaker_id);
        let next = current
            .and_then(|id| self.speakers.iter().position(|style| style.id == id))
            .map(|idx| (idx + 1) % self.speakers.len())
            .unwrap_or(0);
        let style = self.speakers[next].clone();

        self.config.voice_mut().speaker_id = Some(style.id);
        self.session.speech().update_settings(self.config.voice.clone());
        self.status = Some(format!("Speaker: {}", style.label));
        self.save_config();
    }

    /// Starts reloading the speaker list in the background. The result
    /// comes back through [`SpeakerEvents`] and is applied by
    /// [`App::apply_speakers`].
    pub fn refresh_speakers(&mut self) {
        let client = VoicevoxClient::new(&voice_endpoint(&self.config));
        let tx = self.speakers_tx.clone();
        self.status = Some(format!("Loading speakers from {}...", client.base_url()));

        tokio::spawn(async move {
            let result = client.speakers().await;
            let _ = tx.send(SpeakersLoaded { endpoint: client.base_url().to_string(), result });
        });
    }

    /// Selects the first style when none is selected or the saved one no
    /// longer exists.
    pub fn apply_speakers(&mut self, loaded: SpeakersLoaded) {
        match loaded.result {
            Ok(speakers) => {
                info!("Loaded {} speaker styles from {}", speakers.len(), loaded.endpoint);
                self.speakers = speakers;

                let current = self.config.voice.as_ref().and_then(|voice| voice.speaker_id);
                let known = current.is_some_and(|id| self.speakers.iter().any(|s| s.id == id));
                if !known {
                    if let Some(first) = self.speakers.first() {
                        self.config.voice_mut().speaker_id = Some(first.id);
                        self.session.speech().update_settings(self.config.voice.clone());
                        self.save_config();
                    }
                }

                self.status = Some(if self.speakers.is_empty() {
                    "No speakers available".to_string()
                } else {
                    format!("{} speakers loaded", self.speakers.len())
                });
            }
            Err(e) => {
                warn!("Failed to load speakers from {}: {}", loaded.endpoint, e);
                self.status = Some(format!("Failed to load speakers: {}", e));
            }
        }
    }

    pub fn cycle_persona(&mut self) {
        let next = self.persona().map_or(PersonaPreset::Friendly, |preset| preset.next());
        self.config.persona = Some(PersonaPrefs {
            system_prompt: None,
            preset: Some(next.as_str().to_string()),
        });
        self.session.set_system_prompt(&self.config.system_prompt());
        self.status = Some(format!("Persona: {}", next.display_name()));
        self.save_config();
    }

    pub fn clear_history(&mut self) {
        self.stop();
        self.session.clear_history();
        self.log.clear();
        self.chat_scroll = 0;
        self.follow_tail = true;
        self.status = Some("History cleared".to_string());
    }

    pub fn tick_animation(&mut self) {
        self.face.tick();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_tail = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    /// Called by the view once it knows how tall the transcript is.
    pub fn clamp_scroll(&mut self, total_lines: u16) {
        let max_scroll = total_lines.saturating_sub(self.chat_height);
        if self.follow_tail || self.chat_scroll >= max_scroll {
            self.chat_scroll = max_scroll;
            self.follow_tail = true;
        }
    }

    fn save_config(&mut self) {
        if let Err(e) = self.config.save_to(&self.config_path) {
            warn!("Failed to save preferences to {}: {}", self.config_path.display(), e);
            self.status = Some(format!("Failed to save preferences: {}", e));
        }
    }
}

pub fn voice_endpoint(config: &Config) -> String {
    config
        .voice
        .as_ref()
        .map(|voice| voice.endpoint.clone())
        .unwrap_or_else(|| DEFAULT_VOICE_ENDPOINT.to_string())
}
