//! Playback media for the queue.
//!
//! [`DeviceSink`] plays clips on the default output device via rodio.
//! [`WavWriterSink`] "plays" by writing each clip to disk, for headless
//! runs and machines without an audio device.

use std::path::PathBuf;
use std::sync::Arc;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::PodcastError;
use crate::message::{AudioClip, SequenceIndex};
use crate::playback::{AudioEvent, AudioSink};

/// Live playback on the default output device.
///
/// Completion is reported by a watcher task that waits for the rodio sink
/// to drain and sends [`AudioEvent::PlaybackEnded`]. Stopping the sink also
/// drains it, which surfaces as an end event for the stopped clip; the
/// queue discards those as stale.
pub struct DeviceSink {
    _stream: OutputStream,
    sink: Arc<Sink>,
    events: UnboundedSender<AudioEvent>,
}

impl DeviceSink {
    pub fn open(events: UnboundedSender<AudioEvent>) -> Result<Self, PodcastError> {
        let (_stream, handle) = OutputStream::try_default()
            .map_err(|e| PodcastError::AudioError(format!("No audio output device: {}", e)))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| PodcastError::AudioError(format!("Failed to create audio sink: {}", e)))?;
        Ok(Self {
            _stream,
            sink: Arc::new(sink),
            events,
        })
    }
}

impl AudioSink for DeviceSink {
    fn start(&mut self, sequence: SequenceIndex, clip: &AudioClip) -> Result<(), PodcastError> {
        let source = SamplesBuffer::new(1, clip.sample_rate, clip.samples.as_slice().to_vec());
        self.sink.append(source);

        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            sink.sleep_until_end();
            let _ = events.send(AudioEvent::PlaybackEnded { sequence });
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}

/// Writes each clip to `clip_NNN.wav` under a directory and reports the
/// "playback" as instantly ended.
pub struct WavWriterSink {
    dir: PathBuf,
    events: UnboundedSender<AudioEvent>,
}

impl WavWriterSink {
    pub fn new(
        dir: impl Into<PathBuf>,
        events: UnboundedSender<AudioEvent>,
    ) -> Result<Self, PodcastError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            PodcastError::AudioError(format!("Failed to create clip dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir, events })
    }
}

impl AudioSink for WavWriterSink {
    fn start(&mut self, sequence: SequenceIndex, clip: &AudioClip) -> Result<(), PodcastError> {
        let path = self.dir.join(format!("clip_{sequence:03}.wav"));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: clip.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let wav = |e: hound::Error| PodcastError::AudioError(format!("WAV write failed: {}", e));

        let mut writer = hound::WavWriter::create(&path, spec).map_err(wav)?;
        for &sample in clip.samples.iter() {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value).map_err(wav)?;
        }
        writer.finalize().map_err(wav)?;
        debug!(sequence, path = %path.display(), "clip written");

        let _ = self.events.send(AudioEvent::PlaybackEnded { sequence });
        Ok(())
    }

    fn stop(&mut self) {}
}
