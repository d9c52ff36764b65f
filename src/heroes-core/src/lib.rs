//! Heroes of History Core Library
//!
//! Conversation/debate orchestration for AI-voiced historical figures:
//! session control, TTS clip generation, and the sequenced playback queue
//! that delivers the audio one clip at a time.

pub mod config;
pub mod error;
pub mod message;
pub mod persona;
pub mod playback;
pub mod session;
pub mod show_format;
pub mod sink;
pub mod tts;

pub use config::{Config, VoicesConfig, default_config};
pub use error::PodcastError;
pub use message::{AudioClip, AudioState, Message, MessageLog, SequenceIndex, Speaker};
pub use persona::Persona;
pub use playback::{
    AudioEvent, AudioSink, ClipRequest, ClipStore, PlaybackEvent, PlaybackQueue, PlaybackView,
};
pub use session::{
    Session, SessionConfig, SessionEvent, TurnPlan, TurnStep, fetch_completion, sanitize_response,
};
pub use show_format::{HistoricalDebateFormat, ShowFormat, ShowSection};
pub use sink::{DeviceSink, WavWriterSink};
pub use tts::{PodcastTts, TtsClipStore};
