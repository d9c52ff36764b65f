//! Conversation messages and the ordered message log.
//!
//! Each turn of a show becomes a [`Message`] with an immutable sequence
//! index and a per-message audio state machine. The audio state only moves
//! forward: `None -> Generating -> {Ready, Failed}`.

use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::warn;

/// Position of a message in the log. Assigned on append, never changes.
pub type SequenceIndex = usize;

/// Who authored a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Speaker {
    /// Text typed by the listener. Never voiced.
    User,
    /// The show's narrator (section announcements).
    Narrator,
    /// A historical figure, identified by persona id.
    Figure(String),
}

impl Speaker {
    pub fn is_voiced(&self) -> bool {
        !matches!(self, Speaker::User)
    }
}

/// An opaque playable audio resource produced by the TTS collaborator.
///
/// Samples are shared so a clip can sit in the log and in the playback
/// medium at the same time without copying.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
        }
    }

    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Audio generation/playback status of a message.
#[derive(Debug, Clone, Default)]
pub enum AudioState {
    /// No generation requested.
    #[default]
    None,
    /// A generation request is in flight.
    Generating,
    /// A clip is available for playback.
    Ready(AudioClip),
    /// Generation failed. The message will never play.
    Failed,
}

impl AudioState {
    pub fn label(&self) -> &'static str {
        match self {
            AudioState::None => "none",
            AudioState::Generating => "generating",
            AudioState::Ready(_) => "ready",
            AudioState::Failed => "failed",
        }
    }
}

impl Serialize for AudioState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A single turn in the show transcript.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Position in the log.
    pub sequence: SequenceIndex,
    /// Section name when this was spoken, if any.
    pub section: Option<String>,
    /// Who said it.
    pub speaker: Speaker,
    /// Display name of the speaker.
    pub speaker_name: String,
    /// The spoken/displayed content.
    pub text: String,
    /// Audio status. Serialized as a label only; samples stay out of transcripts.
    pub audio: AudioState,
}

impl Message {
    /// The clip, if one is ready.
    pub fn clip(&self) -> Option<&AudioClip> {
        match &self.audio {
            AudioState::Ready(clip) => Some(clip),
            _ => None,
        }
    }
}

/// Append-only ordered sequence of conversation turns.
///
/// Owns every message of a session. All audio state transitions go through
/// the `mark_*` methods, which enforce forward-only movement.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return its sequence index.
    pub fn append(
        &mut self,
        speaker: Speaker,
        speaker_name: impl Into<String>,
        section: Option<String>,
        text: impl Into<String>,
    ) -> SequenceIndex {
        let sequence = self.messages.len();
        self.messages.push(Message {
            sequence,
            section,
            speaker,
            speaker_name: speaker_name.into(),
            text: text.into(),
            audio: AudioState::None,
        });
        sequence
    }

    pub fn get(&self, sequence: SequenceIndex) -> Option<&Message> {
        self.messages.get(sequence)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True while any message has a generation in flight.
    pub fn any_generating(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m.audio, AudioState::Generating))
    }

    /// `None -> Generating`. Returns false (and leaves the state alone) for
    /// any other starting state.
    pub fn mark_generating(&mut self, sequence: SequenceIndex) -> bool {
        self.transition(sequence, |state| match state {
            AudioState::None => Some(AudioState::Generating),
            _ => None,
        })
    }

    /// `Generating -> Ready(clip)`.
    pub fn mark_ready(&mut self, sequence: SequenceIndex, clip: AudioClip) -> bool {
        self.transition(sequence, move |state| match state {
            AudioState::Generating => Some(AudioState::Ready(clip)),
            _ => None,
        })
    }

    /// `Generating -> Failed`.
    pub fn mark_failed(&mut self, sequence: SequenceIndex) -> bool {
        self.transition(sequence, |state| match state {
            AudioState::Generating => Some(AudioState::Failed),
            _ => None,
        })
    }

    fn transition<F>(&mut self, sequence: SequenceIndex, step: F) -> bool
    where
        F: FnOnce(&AudioState) -> Option<AudioState>,
    {
        let Some(message) = self.messages.get_mut(sequence) else {
            warn!(sequence, "audio transition for unknown message");
            return false;
        };
        match step(&message.audio) {
            Some(next) => {
                message.audio = next;
                true
            }
            None => {
                warn!(
                    sequence,
                    state = message.audio.label(),
                    "rejected backwards audio transition"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_one() -> (MessageLog, SequenceIndex) {
        let mut log = MessageLog::new();
        let seq = log.append(
            Speaker::Figure("cleopatra".into()),
            "Cleopatra",
            Some("Opening Statements".into()),
            "Egypt endures.",
        );
        (log, seq)
    }

    #[test]
    fn test_append_assigns_sequential_indices() {
        let mut log = MessageLog::new();
        let a = log.append(Speaker::User, "You", None, "hello");
        let b = log.append(Speaker::Figure("x".into()), "X", None, "hi");
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(a).unwrap().text, "hello");
    }

    #[test]
    fn test_normal_transition_chain() {
        let (mut log, seq) = log_with_one();
        assert!(log.mark_generating(seq));
        assert!(log.any_generating());
        assert!(log.mark_ready(seq, AudioClip::new(vec![0.0; 10], 24000)));
        assert!(!log.any_generating());
        assert!(log.get(seq).unwrap().clip().is_some());
    }

    #[test]
    fn test_failed_transition_chain() {
        let (mut log, seq) = log_with_one();
        assert!(log.mark_generating(seq));
        assert!(log.mark_failed(seq));
        assert!(log.get(seq).unwrap().clip().is_none());
    }

    #[test]
    fn test_state_never_regresses() {
        let (mut log, seq) = log_with_one();
        // Ready without a generation in flight is rejected.
        assert!(!log.mark_ready(seq, AudioClip::new(vec![], 24000)));

        assert!(log.mark_generating(seq));
        // A second generation request is rejected.
        assert!(!log.mark_generating(seq));

        assert!(log.mark_failed(seq));
        // Failed is terminal.
        assert!(!log.mark_ready(seq, AudioClip::new(vec![], 24000)));
        assert!(!log.mark_generating(seq));
        assert!(matches!(log.get(seq).unwrap().audio, AudioState::Failed));
    }

    #[test]
    fn test_transition_on_unknown_sequence() {
        let mut log = MessageLog::new();
        assert!(!log.mark_generating(7));
    }

    #[test]
    fn test_user_messages_are_not_voiced() {
        assert!(!Speaker::User.is_voiced());
        assert!(Speaker::Narrator.is_voiced());
        assert!(Speaker::Figure("id".into()).is_voiced());
    }
}
