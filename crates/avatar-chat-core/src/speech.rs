//! Sequential text-to-speech playback.
//!
//! Fragments are synthesized and played strictly in the order they were
//! enqueued. A single drain task owns the pipeline while it runs; `stop`
//! cancels it at the next suspension point and hands the queue over to a
//! fresh generation so a later enqueue starts clean.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::Player;
use crate::config::VoicePrefs;
use crate::error::SpeechError;
use crate::segment::split_sentences;
use crate::state::Avatar;
use crate::voicevox::VoiceParams;

/// Turns one text fragment into encoded audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<Bytes, SpeechError>;
}

struct QueueState {
    pending: VecDeque<String>,
    playing: bool,
    generation: u64,
    cancel: CancellationToken,
}

struct Inner {
    state: Mutex<QueueState>,
    prefs: Mutex<Option<VoicePrefs>>,
    synth: Mutex<Arc<dyn Synthesizer>>,
    player: Arc<dyn Player>,
    avatar: Arc<dyn Avatar>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn params(&self) -> Option<VoiceParams> {
        lock(&self.prefs).as_ref().and_then(VoicePrefs::params)
    }

    fn synthesizer(&self) -> Arc<dyn Synthesizer> {
        Arc::clone(&lock(&self.synth))
    }
}

/// FIFO speech pipeline shared between the chat session and the UI.
#[derive(Clone)]
pub struct SpeechQueue {
    inner: Arc<Inner>,
}

impl SpeechQueue {
    pub fn new(
        prefs: Option<VoicePrefs>,
        synth: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        avatar: Arc<dyn Avatar>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    playing: false,
                    generation: 0,
                    cancel: CancellationToken::new(),
                }),
                prefs: Mutex::new(prefs),
                synth: Mutex::new(synth),
                player,
                avatar,
            }),
        }
    }

    /// True when a voice block is present, enabled, and has a speaker.
    pub fn is_enabled(&self) -> bool {
        self.inner.params().is_some()
    }

    /// Nothing pending and nothing being synthesized or played.
    pub fn is_idle(&self) -> bool {
        let state = lock(&self.inner.state);
        !state.playing && state.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.inner.state).pending.len()
    }

    /// Splits `text` into fragments and queues them. Must be called from
    /// within a tokio runtime.
    pub fn enqueue(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if !self.is_enabled() {
            debug!("Speech disabled, not queueing {:?}", text);
            return;
        }

        let fragments = split_sentences(text).into_fragments();
        if fragments.is_empty() {
            return;
        }

        let mut state = lock(&self.inner.state);
        state.pending.extend(fragments);
        if state.playing {
            return;
        }

        state.playing = true;
        self.inner.avatar.set_talking(true);
        let inner = Arc::clone(&self.inner);
        let generation = state.generation;
        let token = state.cancel.clone();
        tokio::spawn(drain(inner, generation, token));
    }

    /// Cancels the drain loop, drops pending fragments and halts playback.
    pub fn stop(&self) {
        let mut state = lock(&self.inner.state);
        let dropped = state.pending.len();
        let was_playing = state.playing;

        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.generation = state.generation.wrapping_add(1);
        state.pending.clear();
        state.playing = false;

        self.inner.player.stop();
        self.inner.avatar.set_talking(false);

        if was_playing || dropped > 0 {
            info!("Speech stopped, {} pending fragment(s) dropped", dropped);
        }
    }

    /// Replaces the voice preferences. Fragments already queued pick up the
    /// new values; disabling speech stops the queue.
    pub fn update_settings(&self, prefs: Option<VoicePrefs>) {
        let enabled = prefs.as_ref().and_then(VoicePrefs::params).is_some();
        *lock(&self.inner.prefs) = prefs;
        if !enabled {
            self.stop();
        }
    }

    pub fn set_synthesizer(&self, synth: Arc<dyn Synthesizer>) {
        *lock(&self.inner.synth) = synth;
    }
}

async fn drain(inner: Arc<Inner>, generation: u64, token: CancellationToken) {
    loop {
        let fragment = {
            let mut state = lock(&inner.state);
            if state.generation != generation {
                return;
            }
            match state.pending.pop_front() {
                Some(fragment) => fragment,
                None => {
                    state.playing = false;
                    inner.avatar.set_talking(false);
                    return;
                }
            }
        };

        let Some(params) = inner.params() else {
            debug!("Speech disabled mid-queue, skipping {:?}", fragment);
            continue;
        };

        let synth = inner.synthesizer();
        let audio = tokio::select! {
            _ = token.cancelled() => return,
            result = synth.synthesize(&fragment, &params) => result,
        };
        let audio = match audio {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Synthesis failed for {:?}: {}", fragment, e);
                continue;
            }
        };

        let played = tokio::select! {
            _ = token.cancelled() => return,
            result = inner.player.play(audio) => result,
        };
        if let Err(e) = played {
            warn!("Playback failed for {:?}: {}", fragment, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event_log, wait_until, FakePlayer, FakeSynth, RecordingAvatar};
    use std::time::Duration;

    fn voice(speaker: Option<u32>) -> VoicePrefs {
        VoicePrefs { speaker_id: speaker, ..VoicePrefs::default() }
    }

    fn queue(
        prefs: Option<VoicePrefs>,
        synth: &Arc<FakeSynth>,
        player: &Arc<FakePlayer>,
        avatar: &Arc<RecordingAvatar>,
    ) -> SpeechQueue {
        SpeechQueue::new(prefs, synth.clone(), player.clone(), avatar.clone())
    }

    #[tokio::test]
    async fn test_fragments_play_in_order_despite_latency() {
        let log = event_log();
        let synth = Arc::new(
            FakeSynth::new()
                .with_delay("A.", 40)
                .with_delay("B.", 5)
                .with_delay("C.", 20)
                .logging(&log),
        );
        let player = Arc::new(FakePlayer::new().with_delay(5).logging(&log));
        let avatar = Arc::new(RecordingAvatar::default());
        let queue = queue(Some(voice(Some(1))), &synth, &player, &avatar);

        queue.enqueue("A.");
        queue.enqueue("B. C.");
        wait_until(|| queue.is_idle()).await;

        assert_eq!(player.played(), vec!["A.", "B.", "C."]);
        assert!(!player.overlapped());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["synth A.", "play A.", "synth B.", "play B.", "synth C.", "play C."]
        );
        assert_eq!(avatar.talking(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_enqueue_ignored_without_speaker_or_when_disabled() {
        let synth = Arc::new(FakeSynth::new());
        let player = Arc::new(FakePlayer::new());
        let avatar = Arc::new(RecordingAvatar::default());

        let no_block = queue(None, &synth, &player, &avatar);
        no_block.enqueue("Hello.");
        assert!(no_block.is_idle());

        let no_speaker = queue(Some(voice(None)), &synth, &player, &avatar);
        no_speaker.enqueue("Hello.");
        assert!(no_speaker.is_idle());

        let mut off = voice(Some(1));
        off.enabled = false;
        let disabled = queue(Some(off), &synth, &player, &avatar);
        disabled.enqueue("Hello.");
        assert!(disabled.is_idle());

        let enabled = queue(Some(voice(Some(1))), &synth, &player, &avatar);
        enabled.enqueue("   ");
        assert!(enabled.is_idle());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(synth.calls().is_empty());
        assert!(avatar.talking().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fragment_is_skipped() {
        let synth = Arc::new(FakeSynth::new().failing_on("bad."));
        let player = Arc::new(FakePlayer::new());
        let avatar = Arc::new(RecordingAvatar::default());
        let queue = queue(Some(voice(Some(1))), &synth, &player, &avatar);

        queue.enqueue("good. bad. fine.");
        wait_until(|| queue.is_idle()).await;

        assert_eq!(synth.calls(), vec!["good.", "bad.", "fine."]);
        assert_eq!(player.played(), vec!["good.", "fine."]);
    }

    #[tokio::test]
    async fn test_stop_clears_pending_and_halts_playback() {
        let synth = Arc::new(FakeSynth::new().with_delay("A.", 10_000));
        let player = Arc::new(FakePlayer::new());
        let avatar = Arc::new(RecordingAvatar::default());
        let queue = queue(Some(voice(Some(1))), &synth, &player, &avatar);

        queue.enqueue("A. B. C.");
        wait_until(|| synth.calls().len() == 1).await;
        assert_eq!(queue.pending_len(), 2);

        queue.stop();
        assert!(queue.is_idle());
        assert_eq!(player.stops(), 1);
        assert_eq!(avatar.talking().last(), Some(&false));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(player.played().is_empty());

        // A second stop is harmless and a later enqueue starts a fresh drain.
        queue.stop();
        queue.enqueue("D.");
        wait_until(|| queue.is_idle()).await;
        assert_eq!(player.played(), vec!["D."]);
    }

    #[tokio::test]
    async fn test_disabling_voice_stops_queue() {
        let synth = Arc::new(FakeSynth::new().with_delay("A.", 10_000));
        let player = Arc::new(FakePlayer::new());
        let avatar = Arc::new(RecordingAvatar::default());
        let queue = queue(Some(voice(Some(1))), &synth, &player, &avatar);

        queue.enqueue("A. B.");
        wait_until(|| synth.calls().len() == 1).await;

        let mut off = voice(Some(1));
        off.enabled = false;
        queue.update_settings(Some(off));

        assert!(!queue.is_enabled());
        assert!(queue.is_idle());
        assert_eq!(player.stops(), 1);
    }

    #[tokio::test]
    async fn test_replacement_synthesizer_used_for_next_fragment() {
        let first = Arc::new(FakeSynth::new());
        let second = Arc::new(FakeSynth::new());
        let player = Arc::new(FakePlayer::new());
        let avatar = Arc::new(RecordingAvatar::default());
        let queue = queue(Some(voice(Some(1))), &first, &player, &avatar);

        queue.enqueue("one.");
        wait_until(|| queue.is_idle()).await;
        queue.set_synthesizer(second.clone());
        queue.enqueue("two.");
        wait_until(|| queue.is_idle()).await;

        assert_eq!(first.calls(), vec!["one."]);
        assert_eq!(second.calls(), vec!["two."]);
        assert_eq!(player.played(), vec!["one.", "two."]);
    }
}
