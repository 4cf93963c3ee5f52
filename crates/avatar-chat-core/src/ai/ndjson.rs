//! Incremental decoding of newline-delimited JSON chat streams.
//!
//! Network chunks are buffered as raw bytes and only split at `\n`. The
//! newline byte never occurs inside a multi-byte UTF-8 sequence, so each
//! complete line can be decoded on its own even if the transport cut a
//! character in half.

use std::collections::VecDeque;

use futures_util::{stream, Stream, StreamExt};
use serde::Deserialize;

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    response: Option<String>,
}

/// Extracts the text piece carried by one record, if any.
///
/// Chat-style records carry `message.content`, generate-style records carry a
/// flat `response`. Blank and unparseable lines yield `None`.
pub fn parse_piece(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let chunk: ChatChunk = serde_json::from_str(line).ok()?;
    let from_message = chunk
        .message
        .and_then(|m| m.content)
        .filter(|c| !c.is_empty());
    from_message.or(chunk.response).filter(|p| !p.is_empty())
}

/// Byte buffer that releases complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let Some(last_newline) = self.buf.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, rest);
        complete
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Whatever followed the last newline when the stream ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        if rest.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(String::from_utf8_lossy(&rest).into_owned())
        }
    }
}

struct PieceDecoder<S> {
    inner: S,
    lines: LineBuffer,
    ready: VecDeque<String>,
    finished: bool,
}

impl<S> PieceDecoder<S> {
    fn queue_lines(&mut self, lines: impl IntoIterator<Item = String>) {
        self.ready.extend(lines.into_iter().filter_map(|line| parse_piece(&line)));
    }
}

/// Turns a stream of byte chunks into a stream of text pieces.
///
/// A transport error is yielded once and ends the stream.
pub fn pieces<S, B, E>(inner: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let decoder = PieceDecoder {
        inner,
        lines: LineBuffer::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(decoder, |mut st| async move {
        loop {
            if let Some(piece) = st.ready.pop_front() {
                return Some((Ok(piece), st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    let lines = st.lines.push(chunk.as_ref());
                    st.queue_lines(lines);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    let tail = st.lines.finish();
                    st.queue_lines(tail);
                }
            }
        }
    })
}
