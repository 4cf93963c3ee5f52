use thiserror::Error;

/// Failures of a chat exchange
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Failures while synthesizing or playing a single speech fragment
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("{step} failed with HTTP {status}")]
    Status { step: &'static str, status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Audio output error: {0}")]
    Output(String),

    #[error("Audio decode error: {0}")]
    Decode(String),
}
