//! UI-agnostic conversation types and the collaborator seams
//!
//! The session and the speech queue never render anything themselves. They
//! talk to a [`Transcript`] for visible chat entries and to an [`Avatar`] for
//! mouth animation, so the same core can drive a terminal UI, a webview, or a
//! test double.

use serde::{Deserialize, Serialize};

/// A chat message in the conversation history sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Handle to a transcript entry, issued by the transcript itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub usize);

/// How an assistant entry ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Completed,
    Stopped,
    Failed,
}

/// Visible chat log owned by the front end.
pub trait Transcript {
    fn append_entry(&mut self, role: ChatRole, text: &str) -> EntryId;
    fn update_entry(&mut self, id: EntryId, text: &str);
    /// Marks the entry as no longer pending.
    fn finish_entry(&mut self, id: EntryId, outcome: EntryOutcome);
}

/// Mouth-animation driver.
///
/// Implementations must be cheap and non-blocking: they are called from the
/// speech drain task as well as from the UI task.
pub trait Avatar: Send + Sync {
    fn set_talking(&self, talking: bool);
    /// Called once per streamed piece with its length in characters.
    fn on_assistant_chunk(&self, len: usize);
}

/// An avatar that ignores every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAvatar;

impl Avatar for NoAvatar {
    fn set_talking(&self, _talking: bool) {}
    fn on_assistant_chunk(&self, _len: usize) {}
}
