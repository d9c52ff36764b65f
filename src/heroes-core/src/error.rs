//! Error types for the podcast engine.

use thiserror::Error;

use crate::message::SequenceIndex;

#[derive(Error, Debug)]
pub enum PodcastError {
    #[error("Invalid cast size: expected {min}-{max}, got {actual}")]
    InvalidCastSize {
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown show format: {0}")]
    UnknownFormat(String),

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("Empty response from {0} after retries")]
    EmptyResponse(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("Audio output error: {0}")]
    AudioError(String),

    #[error("No playable clip for message {0}")]
    ClipUnavailable(SequenceIndex),
}
