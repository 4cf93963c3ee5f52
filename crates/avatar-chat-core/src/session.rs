//! One streamed request/response exchange at a time with a chat backend.
//!
//! `submit` spawns a reader task that owns a snapshot of the history and a
//! cancellation token. The task reports back through [`StreamEvent`]s, which
//! the owner feeds to [`ChatSession::handle`] on its own task. Every event is
//! tagged with the request id, and events for anything but the active request
//! are dropped.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::ChatBackend;
use crate::error::ChatError;
use crate::persona::DEFAULT_SYSTEM_PROMPT;
use crate::segment::SentenceAccumulator;
use crate::speech::SpeechQueue;
use crate::state::{Avatar, ChatMessage, ChatRole, EntryId, EntryOutcome, Transcript};

/// Appended to the visible text of an answer that was cut short.
pub const STOPPED_MARKER: &str = " [stopped]";
/// Stored in the history when the model streamed nothing.
pub const EMPTY_ANSWER: &str = "(empty)";
pub const ERROR_PREFIX: &str = "Error: ";

#[derive(Debug)]
pub struct StreamEvent {
    pub id: u64,
    pub kind: StreamEventKind,
}

#[derive(Debug)]
pub enum StreamEventKind {
    /// Response headers arrived.
    Opened,
    Piece(String),
    Finished,
    Failed(ChatError),
}

pub type StreamEvents = mpsc::UnboundedReceiver<StreamEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    /// Waiting for response headers.
    Sending,
    Streaming,
}

struct ActiveRequest {
    id: u64,
    entry: EntryId,
    token: CancellationToken,
    text: String,
    segmenter: SentenceAccumulator,
    state: ExchangeState,
    started: Instant,
    /// Set when the mouth follows the text because speech is off.
    mouth_raised: bool,
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    model: String,
    messages: Vec<ChatMessage>,
    active: Option<ActiveRequest>,
    next_id: u64,
    events: mpsc::UnboundedSender<StreamEvent>,
    speech: SpeechQueue,
    avatar: Arc<dyn Avatar>,
}

impl ChatSession {
    /// Creates a session whose history holds only the system prompt. The
    /// returned receiver must be drained into [`ChatSession::handle`].
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: &str,
        system_prompt: &str,
        speech: SpeechQueue,
        avatar: Arc<dyn Avatar>,
    ) -> (Self, StreamEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            backend,
            model: model.to_string(),
            messages: vec![ChatMessage::system(effective_prompt(system_prompt))],
            active: None,
            next_id: 1,
            events,
            speech,
            avatar,
        };
        (session, rx)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Drops everything but the system message.
    pub fn clear_history(&mut self) {
        self.messages.truncate(1);
    }

    /// Replaces the system message. Blank text restores the default prompt.
    pub fn set_system_prompt(&mut self, prompt: &str) {
        let message = ChatMessage::system(effective_prompt(prompt));
        match self.messages.first_mut() {
            Some(first) => *first = message,
            None => self.messages.push(message),
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.active.as_ref().map_or(ExchangeState::Idle, |active| active.state)
    }

    pub fn speech(&self) -> &SpeechQueue {
        &self.speech
    }

    /// Starts a new exchange, cancelling the one in flight.
    pub fn submit(&mut self, text: &str, transcript: &mut dyn Transcript) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.cancel(transcript);

        self.messages.push(ChatMessage::user(text));
        transcript.append_entry(ChatRole::User, text);
        let entry = transcript.append_entry(ChatRole::Assistant, "");

        let id = self.next_id;
        self.next_id += 1;
        let token = CancellationToken::new();

        info!("Submitting request {} to {} ({} messages)", id, self.model, self.messages.len());
        tokio::spawn(read_stream(
            Arc::clone(&self.backend),
            self.model.clone(),
            self.messages.clone(),
            id,
            token.clone(),
            self.events.clone(),
        ));

        self.active = Some(ActiveRequest {
            id,
            entry,
            token,
            text: String::new(),
            segmenter: SentenceAccumulator::new(),
            state: ExchangeState::Sending,
            started: Instant::now(),
            mouth_raised: false,
        });
        Ok(())
    }

    /// Aborts the exchange in flight, if any. Queued speech is left alone.
    pub fn cancel(&mut self, transcript: &mut dyn Transcript) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.token.cancel();
        transcript.update_entry(active.entry, &format!("{}{}", active.text, STOPPED_MARKER));
        transcript.finish_entry(active.entry, EntryOutcome::Stopped);
        if active.mouth_raised {
            self.avatar.set_talking(false);
        }
        info!("Request {} stopped after {:?}", active.id, active.started.elapsed());
    }

    /// Cancels the exchange and silences speech.
    pub fn stop(&mut self, transcript: &mut dyn Transcript) {
        self.cancel(transcript);
        self.speech.stop();
    }

    /// Applies one event from the reader task.
    pub fn handle(&mut self, event: StreamEvent, transcript: &mut dyn Transcript) {
        let Some(active) = self.active.as_mut().filter(|active| active.id == event.id) else {
            debug!("Dropping event for inactive request {}", event.id);
            return;
        };

        match event.kind {
            StreamEventKind::Opened => {
                active.state = ExchangeState::Streaming;
            }
            StreamEventKind::Piece(piece) => {
                if piece.is_empty() {
                    return;
                }
                active.state = ExchangeState::Streaming;
                active.text.push_str(&piece);
                transcript.update_entry(active.entry, &active.text);
                self.avatar.on_assistant_chunk(piece.chars().count());

                for fragment in active.segmenter.push(&piece) {
                    self.speech.enqueue(&fragment);
                }
                if !active.mouth_raised && !self.speech.is_enabled() {
                    active.mouth_raised = true;
                    self.avatar.set_talking(true);
                }
            }
            StreamEventKind::Finished => {
                if let Some(active) = self.active.take() {
                    self.complete(active, transcript);
                }
            }
            StreamEventKind::Failed(err) => {
                if let Some(active) = self.active.take() {
                    self.fail(active, err, transcript);
                }
            }
        }
    }

    fn complete(&mut self, mut active: ActiveRequest, transcript: &mut dyn Transcript) {
        if let Some(rest) = active.segmenter.finish() {
            self.speech.enqueue(&rest);
        }

        let content = if active.text.trim().is_empty() {
            transcript.update_entry(active.entry, EMPTY_ANSWER);
            EMPTY_ANSWER.to_string()
        } else {
            active.text
        };
        self.messages.push(ChatMessage::assistant(content));
        transcript.finish_entry(active.entry, EntryOutcome::Completed);

        if active.mouth_raised {
            self.avatar.set_talking(false);
        }
        info!("Request {} completed in {:?}", active.id, active.started.elapsed());
    }

    fn fail(&mut self, active: ActiveRequest, err: ChatError, transcript: &mut dyn Transcript) {
        warn!("Request {} failed: {}", active.id, err);
        transcript.update_entry(active.entry, &format!("{}{}", ERROR_PREFIX, err));
        transcript.finish_entry(active.entry, EntryOutcome::Failed);
        if active.mouth_raised {
            self.avatar.set_talking(false);
        }
    }
}

fn effective_prompt(prompt: &str) -> &str {
    if prompt.trim().is_empty() {
        DEFAULT_SYSTEM_PROMPT
    } else {
        prompt
    }
}

async fn read_stream(
    backend: Arc<dyn ChatBackend>,
    model: String,
    messages: Vec<ChatMessage>,
    id: u64,
    token: CancellationToken,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    let send = |kind| events.send(StreamEvent { id, kind }).is_ok();

    let opened = tokio::select! {
        _ = token.cancelled() => return,
        result = backend.open_chat(&model, &messages) => result,
    };
    let mut pieces = match opened {
        Ok(pieces) => pieces,
        Err(err) => {
            send(StreamEventKind::Failed(err));
            return;
        }
    };
    if !send(StreamEventKind::Opened) {
        return;
    }

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return,
            next = pieces.next() => next,
        };
        let delivered = match next {
            Some(Ok(piece)) => send(StreamEventKind::Piece(piece)),
            Some(Err(err)) => {
                send(StreamEventKind::Failed(err));
                return;
            }
            None => {
                send(StreamEventKind::Finished);
                return;
            }
        };
        if !delivered {
            return;
        }
    }
}
