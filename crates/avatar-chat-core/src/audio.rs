//! Audio playback for synthesized speech.

use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use tracing::debug;

use crate::error::SpeechError;

/// Plays one encoded audio buffer at a time.
#[async_trait]
pub trait Player: Send + Sync {
    /// Resolves when playback finished or was stopped.
    async fn play(&self, audio: Bytes) -> Result<(), SpeechError>;

    /// Halts the current playback and releases its output. No-op when idle.
    fn stop(&self);
}

#[derive(Default)]
struct Slot {
    sink: Option<Arc<Sink>>,
    /// Bumped by every stop so a playback that is still starting up can tell
    /// it was cancelled before its sink was registered.
    generation: u64,
}

/// Plays WAV (or any rodio-decodable) audio on the default output device.
#[derive(Default, Clone)]
pub struct RodioPlayer {
    slot: Arc<Mutex<Slot>>,
}

impl RodioPlayer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn release(slot: &Mutex<Slot>, sink: &Arc<Sink>) {
    sink.stop();
    let mut guard = lock(slot);
    if guard.sink.as_ref().is_some_and(|current| Arc::ptr_eq(current, sink)) {
        guard.sink = None;
    }
}

fn play_blocking(audio: Bytes, slot: &Mutex<Slot>, generation: u64) -> Result<(), SpeechError> {
    let source = Decoder::new(Cursor::new(audio)).map_err(|e| SpeechError::Decode(e.to_string()))?;

    let mut stream = OutputStreamBuilder::open_default_stream()
        .map_err(|e| SpeechError::Output(e.to_string()))?;
    // Dropping the stream would otherwise print to stderr, which the TUI owns.
    stream.log_on_drop(false);

    let sink = Arc::new(Sink::connect_new(stream.mixer()));
    sink.append(source);

    {
        let mut guard = lock(slot);
        if guard.generation != generation {
            debug!("Playback stopped before it started");
            drop(guard);
            sink.stop();
            return Ok(());
        }
        guard.sink = Some(Arc::clone(&sink));
    }

    sink.sleep_until_end();
    release(slot, &sink);
    drop(stream);
    Ok(())
}

#[async_trait]
impl Player for RodioPlayer {
    async fn play(&self, audio: Bytes) -> Result<(), SpeechError> {
        let generation = lock(&self.slot).generation;
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || play_blocking(audio, &slot, generation))
            .await
            .map_err(|e| SpeechError::Output(format!("playback task failed: {}", e)))?
    }

    fn stop(&self) {
        let sink = {
            let mut guard = lock(&self.slot);
            guard.generation = guard.generation.wrapping_add(1);
            guard.sink.take()
        };
        if let Some(sink) = sink {
            sink.stop();
        }
    }
}
