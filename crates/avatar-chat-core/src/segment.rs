//! Sentence segmentation for speech output.
//!
//! Text is cut after every sentence-terminal character so that each fragment
//! can be synthesized as soon as it is complete, while the model is still
//! streaming the rest of the answer.

/// Characters that end a speech fragment. Both full-width and half-width forms.
const TERMINATORS: [char; 8] = ['。', '．', '.', '!', '?', '！', '？', '\n'];

fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// Result of [`split_sentences`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    /// Trimmed, non-empty fragments, each ending with its terminator.
    pub complete: Vec<String>,
    /// Text after the last terminator, untrimmed so it can be carried forward.
    pub remainder: String,
}

impl Segments {
    /// All fragments including a non-blank remainder.
    pub fn into_fragments(self) -> Vec<String> {
        let mut out = self.complete;
        let rest = self.remainder.trim();
        if !rest.is_empty() {
            out.push(rest.to_string());
        }
        out
    }
}

pub fn split_sentences(text: &str) -> Segments {
    let mut complete = Vec::new();
    let mut buf = String::new();

    for c in text.chars() {
        buf.push(c);
        if is_terminator(c) {
            let fragment = buf.trim();
            if !fragment.is_empty() {
                complete.push(fragment.to_string());
            }
            buf.clear();
        }
    }

    Segments { complete, remainder: buf }
}

/// Byte offset where the text still owed to the caller begins: the unterminated
/// tail when it has content, otherwise the raw start of the last fragment.
fn held_back_start(text: &str) -> usize {
    let mut segment_start = 0;
    let mut last_fragment = 0;
    for (i, c) in text.char_indices() {
        if is_terminator(c) {
            let end = i + c.len_utf8();
            if !text[segment_start..end].trim().is_empty() {
                last_fragment = segment_start;
            }
            segment_start = end;
        }
    }
    if text[segment_start..].trim().is_empty() {
        last_fragment
    } else {
        segment_start
    }
}

/// Carries the incomplete tail of a streamed answer between pieces.
#[derive(Debug, Default)]
pub struct SentenceAccumulator {
    pending: String,
}

impl SentenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a streamed piece and returns the fragments it completed.
    ///
    /// The newest fragment is held back even when it already ends with a
    /// terminator; it is released once more text follows it or on [`finish`].
    ///
    /// [`finish`]: SentenceAccumulator::finish
    pub fn push(&mut self, piece: &str) -> Vec<String> {
        self.pending.push_str(piece);
        // The held text stays raw so a trailing newline still ends it.
        let held = self.pending.split_off(held_back_start(&self.pending));
        let released = split_sentences(&self.pending).complete;
        self.pending = held;
        released
    }

    /// Drains whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
