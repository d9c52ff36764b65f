//! TTS synthesis using kokoro-tiny.
//!
//! Turns transcript text into [`AudioClip`]s, one voice per figure, and
//! assembles finished episodes into a single WAV.

use std::path::Path;
use std::sync::{Arc, Mutex};

use kokoro_tiny::TtsEngine;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::config::VoicesConfig;
use crate::error::PodcastError;
use crate::message::AudioClip;
use crate::persona::Persona;
use crate::playback::{AudioEvent, ClipRequest, ClipStore};

/// Kokoro output sample rate.
pub const SAMPLE_RATE: u32 = 24_000;

/// TTS synthesizer for show audio.
pub struct PodcastTts {
    engine: TtsEngine,
    voices: VoicesConfig,
    available_voices: Vec<String>,
}

impl PodcastTts {
    /// Initialize the TTS engine (downloads model on first run).
    pub async fn new(voices: VoicesConfig) -> Result<Self, PodcastError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| PodcastError::TtsError(format!("Failed to initialize TTS: {}", e)))?;

        let available_voices = engine.voices();

        Ok(Self {
            engine,
            voices,
            available_voices,
        })
    }

    /// Get list of available voice IDs.
    pub fn available_voices(&self) -> &[String] {
        &self.available_voices
    }

    /// Voice used for section announcements.
    pub fn narrator_voice(&self) -> &str {
        &self.voices.narrator_voice
    }

    /// Validate that a voice ID exists.
    pub fn validate_voice(&self, voice_id: &str) -> Result<(), PodcastError> {
        if voice_id.is_empty() {
            return Err(PodcastError::TtsError(format!(
                "Voice ID cannot be empty. Available voices:\n{}",
                self.format_available_voices()
            )));
        }

        if !self.available_voices.contains(&voice_id.to_string()) {
            return Err(PodcastError::TtsError(format!(
                "Unknown voice '{}'. Available voices:\n{}",
                voice_id,
                self.format_available_voices()
            )));
        }

        Ok(())
    }

    /// Format available voices for display.
    fn format_available_voices(&self) -> String {
        let mut english_voices: Vec<&String> = self
            .available_voices
            .iter()
            .filter(|v| {
                v.starts_with("af_")
                    || v.starts_with("am_")
                    || v.starts_with("bf_")
                    || v.starts_with("bm_")
            })
            .collect();
        english_voices.sort();

        english_voices
            .iter()
            .map(|v| format!("  - {}", v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validate the narrator voice and every cast member's voice.
    pub fn validate_cast(&self, cast: &[Persona]) -> Result<(), PodcastError> {
        self.validate_voice(&self.voices.narrator_voice)?;
        self.validate_voice(&self.voices.default_voice)?;
        for persona in cast {
            self.validate_voice(&persona.voice)?;
        }
        Ok(())
    }

    /// Synthesize text in chunks to handle long text.
    /// Kokoro-tiny has a strict limit on text length, so we split into small chunks.
    pub fn synthesize(&mut self, text: &str, voice_id: &str) -> Result<Vec<f32>, PodcastError> {
        self.validate_voice(voice_id)?;

        // Split text into small chunks (kokoro has ~200 char safe limit)
        let chunks = split_into_chunks(text, 200);

        let mut all_samples = Vec::new();

        for chunk in chunks {
            if chunk.trim().is_empty() {
                continue;
            }

            let samples = self
                .engine
                .synthesize(&chunk, Some(voice_id))
                .map_err(|e| PodcastError::TtsError(format!("Synthesis failed: {}", e)))?;

            all_samples.extend(samples);

            // Pause between chunks (0.3 seconds at 24kHz) to prevent cutoff
            all_samples.extend(vec![0.0; 7200]);
        }

        // Trailing padding (0.5 seconds) so the final word is not clipped
        all_samples.extend(vec![0.0; 12000]);

        Ok(all_samples)
    }

    /// Synthesize text into a playable clip.
    pub fn clip(&mut self, text: &str, voice_id: &str) -> Result<AudioClip, PodcastError> {
        let samples = self.synthesize(text, voice_id)?;
        Ok(AudioClip::new(samples, SAMPLE_RATE))
    }

    /// Save audio samples to a WAV file.
    pub fn save_wav<P: AsRef<Path>>(&self, path: P, samples: &[f32]) -> Result<(), PodcastError> {
        self.engine
            .save_wav(path.as_ref().to_str().unwrap_or("episode.wav"), samples)
            .map_err(|e| PodcastError::TtsError(format!("Failed to save WAV: {}", e)))
    }
}

/// Production [`ClipStore`]: synthesizes off the driver task and reports
/// completions over the audio event channel.
///
/// The synthesizer sits behind a mutex, so generation requests race freely
/// but synthesis itself is serialized; the order completions come back is
/// the order clips will play.
pub struct TtsClipStore {
    tts: Arc<Mutex<PodcastTts>>,
    events: UnboundedSender<AudioEvent>,
}

impl TtsClipStore {
    pub fn new(tts: PodcastTts, events: UnboundedSender<AudioEvent>) -> Self {
        Self {
            tts: Arc::new(Mutex::new(tts)),
            events,
        }
    }

    /// Shared handle to the synthesizer, for episode assembly after the show.
    pub fn shared(&self) -> Arc<Mutex<PodcastTts>> {
        Arc::clone(&self.tts)
    }
}

impl ClipStore for TtsClipStore {
    fn generate(&self, request: ClipRequest) {
        let tts = Arc::clone(&self.tts);
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            let result = tts
                .lock()
                .map_err(|_| PodcastError::TtsError("synthesizer lock poisoned".into()))
                .and_then(|mut tts| tts.clip(&request.text, &request.voice));
            let event = match result {
                Ok(clip) => AudioEvent::ClipReady {
                    sequence: request.sequence,
                    clip,
                },
                Err(err) => {
                    warn!(sequence = request.sequence, error = %err, "clip generation failed");
                    AudioEvent::ClipFailed {
                        sequence: request.sequence,
                    }
                }
            };
            // Receiver gone means the session is over; nothing to report.
            let _ = events.send(event);
        });
    }
}

/// Split text into chunks that are safe for TTS synthesis.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    // Split by sentence-ending punctuation
    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars {
            if !current_chunk.is_empty() {
                chunks.push(current_chunk.trim().to_string());
                current_chunk = String::new();
            }

            // If a single sentence is too long, split by commas
            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(',') {
                    if current_chunk.len() + part.len() > max_chars {
                        if !current_chunk.is_empty() {
                            chunks.push(current_chunk.trim().to_string());
                            current_chunk = String::new();
                        }
                    }
                    current_chunk.push_str(part);
                    current_chunk.push(' ');
                }
            } else {
                current_chunk.push_str(sentence);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

/// Adjust audio playback speed using linear interpolation.
/// Rate < 1.0 = slower (e.g., 0.75 = 75% speed), Rate > 1.0 = faster.
pub fn adjust_audio_speed(samples: Vec<f32>, rate: f32) -> Vec<f32> {
    if (rate - 1.0).abs() < 0.001 {
        return samples; // No change needed
    }

    // New length (slower = longer)
    let new_len = (samples.len() as f32 / rate) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f32 * rate;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f32;

        if src_idx + 1 < samples.len() {
            // Linear interpolation between adjacent samples
            let sample = samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac;
            result.push(sample);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}

/// Combine multiple audio segments with silence gaps.
pub fn combine_audio_segments(
    segments: Vec<Vec<f32>>,
    gap_seconds: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let gap_samples = (gap_seconds * sample_rate as f32) as usize;
    let silence: Vec<f32> = vec![0.0; gap_samples];

    let mut combined = Vec::new();

    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            combined.extend(&silence);
        }
        combined.extend(segment);
    }

    combined
}

/// Generate filename for episode output.
pub fn generate_output_filename(topic: &str) -> String {
    // Sanitize topic for filename
    let sanitized: String = topic
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Truncate if too long
    let truncated = if sanitized.len() > 50 {
        &sanitized[..50]
    } else {
        &sanitized
    };

    format!("Heroes of History - {}.wav", truncated.trim())
}
