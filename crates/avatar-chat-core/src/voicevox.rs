use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::SpeechError;
use crate::speech::Synthesizer;

/// Per-fragment synthesis settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub speaker: u32,
    pub speed: f32,
    pub volume: f32,
}

#[derive(Deserialize)]
struct SpeakerStyleEntry {
    id: u32,
    name: String,
}

#[derive(Deserialize)]
struct SpeakerEntry {
    name: String,
    #[serde(default)]
    styles: Vec<SpeakerStyleEntry>,
}

/// One selectable voice: a speaker in a particular style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerStyle {
    pub id: u32,
    pub label: String,
}

#[derive(Clone)]
pub struct VoicevoxClient {
    client: Client,
    base_url: String,
}

impl VoicevoxClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lists every speaker style the engine offers.
    pub async fn speakers(&self) -> Result<Vec<SpeakerStyle>, SpeechError> {
        let url = format!("{}/speakers", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(SpeechError::Status {
                step: "speakers",
                status: response.status().as_u16(),
            });
        }

        let speakers: Vec<SpeakerEntry> = response.json().await?;
        Ok(flatten_speakers(speakers))
    }

    /// First step: ask the engine for a synthesis recipe.
    pub async fn audio_query(&self, text: &str, speaker: u32) -> Result<Value, SpeechError> {
        let url = format!("{}/audio_query", self.base_url);
        let speaker = speaker.to_string();

        let response = self
            .client
            .post(&url)
            .query(&[("speaker", speaker.as_str()), ("text", text)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpeechError::Status {
                step: "audio_query",
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    /// Second step: render a recipe to WAV bytes.
    pub async fn synthesis(&self, recipe: &Value, speaker: u32) -> Result<Bytes, SpeechError> {
        let url = format!("{}/synthesis", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[("speaker", speaker)])
            .json(recipe)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpeechError::Status {
                step: "synthesis",
                status: response.status().as_u16(),
            });
        }

        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl Synthesizer for VoicevoxClient {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<Bytes, SpeechError> {
        let mut recipe = self.audio_query(text, params.speaker).await?;
        apply_scales(&mut recipe, params);
        let audio = self.synthesis(&recipe, params.speaker).await?;
        debug!("Synthesized {} bytes for speaker {}", audio.len(), params.speaker);
        Ok(audio)
    }
}

/// Writes speed and volume into a recipe. Non-object recipes are left alone.
fn apply_scales(recipe: &mut Value, params: &VoiceParams) {
    if let Some(obj) = recipe.as_object_mut() {
        obj.insert("speedScale".to_string(), Value::from(params.speed));
        obj.insert("volumeScale".to_string(), Value::from(params.volume));
    }
}

fn flatten_speakers(speakers: Vec<SpeakerEntry>) -> Vec<SpeakerStyle> {
    speakers
        .into_iter()
        .flat_map(|speaker| {
            let name = speaker.name;
            speaker.styles.into_iter().map(move |style| SpeakerStyle {
                id: style.id,
                label: format!("{}（{}） [{}]", name, style.name, style.id),
            })
        })
        .collect()
}
