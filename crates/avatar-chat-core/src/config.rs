use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::persona::{resolve_system_prompt, PersonaPreset};
use crate::voicevox::VoiceParams;

pub const DEFAULT_CHAT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-oss:20b";
pub const DEFAULT_VOICE_ENDPOINT: &str = "http://127.0.0.1:50021";

/// Persisted user preferences. Every change is written back whole, so the
/// last write wins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatPrefs,
    /// Absent until the user saves a persona.
    #[serde(default)]
    pub persona: Option<PersonaPrefs>,
    /// Absent means speech output is not configured at all.
    #[serde(default)]
    pub voice: Option<VoicePrefs>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatPrefs {
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PersonaPrefs {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub preset: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VoicePrefs {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_voice_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub speaker_id: Option<u32>,
    #[serde(default = "default_scale")]
    pub speed: f32,
    #[serde(default = "default_scale")]
    pub volume: f32,
}

fn default_chat_endpoint() -> String {
    DEFAULT_CHAT_ENDPOINT.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_voice_endpoint() -> String {
    DEFAULT_VOICE_ENDPOINT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f32 {
    1.0
}

impl Default for ChatPrefs {
    fn default() -> Self {
        Self {
            endpoint: default_chat_endpoint(),
            model: default_chat_model(),
        }
    }
}

impl Default for VoicePrefs {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_voice_endpoint(),
            speaker_id: None,
            speed: 1.0,
            volume: 1.0,
        }
    }
}

impl VoicePrefs {
    /// Synthesis parameters, or `None` when speech should stay silent.
    pub fn params(&self) -> Option<VoiceParams> {
        if !self.enabled {
            return None;
        }
        self.speaker_id.map(|speaker| VoiceParams {
            speaker,
            speed: self.speed,
            volume: self.volume,
        })
    }
}

impl PersonaPrefs {
    pub fn preset(&self) -> Option<PersonaPreset> {
        self.preset.as_deref().and_then(|preset| preset.parse().ok())
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            chat: ChatPrefs::default(),
            persona: None,
            voice: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn system_prompt(&self) -> String {
        match &self.persona {
            Some(persona) => resolve_system_prompt(persona.system_prompt.as_deref(), persona.preset()),
            None => resolve_system_prompt(None, None),
        }
    }

    /// Voice block, created with defaults on first use.
    pub fn voice_mut(&mut self) -> &mut VoicePrefs {
        self.voice.get_or_insert_with(VoicePrefs::default)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("avatar-chat").join("config.json"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::DEFAULT_SYSTEM_PROMPT;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.chat.endpoint, DEFAULT_CHAT_ENDPOINT);
        assert!(config.voice.is_none());
    }

    #[test]
    fn test_save_then_load_keeps_last_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.voice_mut().speaker_id = Some(3);
        config.save_to(&path).unwrap();

        config.voice_mut().speed = 1.4;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        let voice = loaded.voice.unwrap();
        assert_eq!(voice.speaker_id, Some(3));
        assert!((voice.speed - 1.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"voice":{"speaker_id":8}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        let voice = config.voice.unwrap();
        assert!(voice.enabled);
        assert_eq!(voice.endpoint, DEFAULT_VOICE_ENDPOINT);
        assert_eq!(config.chat.model, DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_voice_params_require_speaker_and_enabled() {
        let mut voice = VoicePrefs::default();
        assert!(voice.params().is_none());

        voice.speaker_id = Some(1);
        assert_eq!(voice.params().map(|p| p.speaker), Some(1));

        voice.enabled = false;
        assert!(voice.params().is_none());
    }

    #[test]
    fn test_system_prompt_resolution() {
        let mut config = Config::new();
        assert_eq!(config.system_prompt(), DEFAULT_SYSTEM_PROMPT);

        config.persona = Some(PersonaPrefs {
            system_prompt: None,
            preset: Some("serious".to_string()),
        });
        assert_eq!(config.system_prompt(), PersonaPreset::Serious.prompt());
    }
}
