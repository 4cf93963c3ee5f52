use avatar_chat_core::{ChatRole, EntryId, EntryOutcome, Transcript};

/// One visible chat bubble
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub role: ChatRole,
    pub text: String,
    /// `None` while the assistant is still answering.
    pub outcome: Option<EntryOutcome>,
}

impl LogEntry {
    pub fn is_pending(&self) -> bool {
        self.role == ChatRole::Assistant && self.outcome.is_none()
    }
}

/// The chat log shown in the transcript pane.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<LogEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Adds an entry that is already complete, such as the greeting.
    pub fn push_complete(&mut self, role: ChatRole, text: &str) {
        let id = self.append_entry(role, text);
        self.finish_entry(id, EntryOutcome::Completed);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Transcript for ChatLog {
    fn append_entry(&mut self, role: ChatRole, text: &str) -> EntryId {
        let outcome = match role {
            ChatRole::Assistant => None,
            _ => Some(EntryOutcome::Completed),
        };
        self.entries.push(LogEntry { role, text: text.to_string(), outcome });
        EntryId(self.entries.len() - 1)
    }

    fn update_entry(&mut self, id: EntryId, text: &str) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.text.clear();
            entry.text.push_str(text);
        }
    }

    fn finish_entry(&mut self, id: EntryId, outcome: EntryOutcome) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.outcome = Some(outcome);
        }
    }
}
