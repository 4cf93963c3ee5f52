pub mod ai;
pub mod audio;
pub mod config;
pub mod error;
pub mod persona;
pub mod segment;
pub mod session;
pub mod speech;
pub mod state;
pub mod voicevox;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use ai::{ChatBackend, OllamaClient, PieceStream};
pub use audio::{Player, RodioPlayer};
pub use config::{ChatPrefs, Config, PersonaPrefs, VoicePrefs};
pub use error::{ChatError, SpeechError};
pub use persona::{PersonaPreset, DEFAULT_SYSTEM_PROMPT};
pub use segment::{split_sentences, SentenceAccumulator, Segments};
pub use session::{ChatSession, ExchangeState, StreamEvent, StreamEventKind, StreamEvents};
pub use speech::{SpeechQueue, Synthesizer};
pub use state::{Avatar, ChatMessage, ChatRole, EntryId, EntryOutcome, NoAvatar, Transcript};
pub use voicevox::{SpeakerStyle, VoiceParams, VoicevoxClient};
