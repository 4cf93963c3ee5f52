//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::ai::{ChatBackend, PieceStream};
use crate::audio::Player;
use crate::error::{ChatError, SpeechError};
use crate::speech::Synthesizer;
use crate::state::{Avatar, ChatMessage, ChatRole, EntryId, EntryOutcome, Transcript};
use crate::voicevox::VoiceParams;

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[derive(Default)]
pub struct FakeSynth {
    delays: HashMap<String, u64>,
    fail_on: Option<String>,
    calls: Mutex<Vec<String>>,
    log: Option<EventLog>,
}

impl FakeSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, text: &str, millis: u64) -> Self {
        self.delays.insert(text.to_string(), millis);
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub fn logging(mut self, log: &EventLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynth {
    async fn synthesize(&self, text: &str, _params: &VoiceParams) -> Result<Bytes, SpeechError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("synth {}", text));
        }
        if let Some(millis) = self.delays.get(text) {
            tokio::time::sleep(Duration::from_millis(*millis)).await;
        }
        if self.fail_on.as_deref() == Some(text) {
            return Err(SpeechError::Status { step: "synthesis", status: 500 });
        }
        Ok(Bytes::from(text.to_string()))
    }
}

/// Plays the synthesized text back as if it were audio.
#[derive(Default)]
pub struct FakePlayer {
    delay_ms: u64,
    played: Mutex<Vec<String>>,
    stops: AtomicUsize,
    active: Arc<AtomicBool>,
    overlapped: AtomicBool,
    log: Option<EventLog>,
}

struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FakePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay_ms = millis;
        self
    }

    pub fn logging(mut self, log: &EventLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Player for FakePlayer {
    async fn play(&self, audio: Bytes) -> Result<(), SpeechError> {
        if self.active.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let _guard = ActiveGuard(Arc::clone(&self.active));
        let text = String::from_utf8_lossy(&audio).into_owned();
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("play {}", text));
        }
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.played.lock().unwrap().push(text);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingAvatar {
    talking: Mutex<Vec<bool>>,
    chunks: Mutex<Vec<usize>>,
}

impl RecordingAvatar {
    pub fn talking(&self) -> Vec<bool> {
        self.talking.lock().unwrap().clone()
    }

    pub fn chunks(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().clone()
    }
}

impl Avatar for RecordingAvatar {
    fn set_talking(&self, talking: bool) {
        self.talking.lock().unwrap().push(talking);
    }

    fn on_assistant_chunk(&self, len: usize) {
        self.chunks.lock().unwrap().push(len);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub role: ChatRole,
    pub text: String,
    pub outcome: Option<EntryOutcome>,
}

#[derive(Default)]
pub struct RecordingTranscript {
    pub entries: Vec<Entry>,
    pub updates: usize,
}

impl RecordingTranscript {
    pub fn text(&self, id: EntryId) -> &str {
        &self.entries[id.0].text
    }

    pub fn last(&self) -> &Entry {
        self.entries.last().expect("transcript is empty")
    }
}

impl Transcript for RecordingTranscript {
    fn append_entry(&mut self, role: ChatRole, text: &str) -> EntryId {
        self.entries.push(Entry { role, text: text.to_string(), outcome: None });
        EntryId(self.entries.len() - 1)
    }

    fn update_entry(&mut self, id: EntryId, text: &str) {
        self.updates += 1;
        self.entries[id.0].text = text.to_string();
    }

    fn finish_entry(&mut self, id: EntryId, outcome: EntryOutcome) {
        self.entries[id.0].outcome = Some(outcome);
    }
}

pub enum Script {
    /// Streams the pieces, then ends.
    Pieces(Vec<&'static str>),
    /// Streams the pieces, then never ends.
    Hang(Vec<&'static str>),
    /// Fails before any piece.
    Fail(ChatError),
}

/// Replays one script per request and records what was sent.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.requests.lock().unwrap().clone()
    }
}

fn owned(pieces: Vec<&'static str>) -> Vec<Result<String, ChatError>> {
    pieces.into_iter().map(|p| Ok(p.to_string())).collect()
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_chat(&self, model: &str, messages: &[ChatMessage]) -> Result<PieceStream, ChatError> {
        self.requests.lock().unwrap().push((model.to_string(), messages.to_vec()));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Pieces(Vec::new()));
        match script {
            Script::Pieces(pieces) => Ok(Box::pin(stream::iter(owned(pieces)))),
            Script::Hang(pieces) => Ok(Box::pin(stream::iter(owned(pieces)).chain(stream::pending()))),
            Script::Fail(err) => Err(err),
        }
    }
}
