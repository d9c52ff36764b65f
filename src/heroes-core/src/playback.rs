//! Sequenced playback of generated audio clips.
//!
//! Clips are synthesized concurrently but must reach the listener one at a
//! time. [`PlaybackQueue`] owns the pending FIFO, the single `now_playing`
//! slot, and the mute switch, and recovers from generation or playback
//! failures by advancing instead of stalling.
//!
//! Queue position is decided by *completion* order: the first clip to come
//! back from the synthesizer plays first, regardless of the order the
//! requests were issued.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::PodcastError;
use crate::message::{AudioClip, MessageLog, SequenceIndex};

/// A clip generation request handed to the [`ClipStore`].
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub sequence: SequenceIndex,
    pub text: String,
    pub voice: String,
}

/// Fire-and-forget clip generation seam.
///
/// Implementations kick off synthesis in the background and report back
/// through [`AudioEvent::ClipReady`] / [`AudioEvent::ClipFailed`].
pub trait ClipStore {
    fn generate(&self, request: ClipRequest);
}

/// The playback medium seam.
///
/// `start` must begin playback without blocking; the medium reports
/// completion through [`AudioEvent::PlaybackEnded`] /
/// [`AudioEvent::PlaybackError`]. `stop` cuts off in-flight audio
/// immediately and unconditionally.
pub trait AudioSink {
    fn start(&mut self, sequence: SequenceIndex, clip: &AudioClip) -> Result<(), PodcastError>;
    fn stop(&mut self);
}

/// Notifications from the collaborators, dispatched via
/// [`PlaybackQueue::handle_event`].
#[derive(Debug, Clone)]
pub enum AudioEvent {
    /// Synthesis finished for a message.
    ClipReady {
        sequence: SequenceIndex,
        clip: AudioClip,
    },
    /// Synthesis failed for a message.
    ClipFailed { sequence: SequenceIndex },
    /// The medium finished playing a clip.
    PlaybackEnded { sequence: SequenceIndex },
    /// The medium could not play a clip to the end.
    PlaybackError { sequence: SequenceIndex },
}

/// Observer events for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { sequence: SequenceIndex },
    Finished { sequence: SequenceIndex },
    /// The clip could not be played; the queue has moved on.
    Failed { sequence: SequenceIndex },
    /// Playback was cut off (mute or replay).
    Stopped { sequence: SequenceIndex },
    MuteChanged { muted: bool },
}

/// Callback for playback events.
pub type PlaybackCallback = Box<dyn Fn(PlaybackEvent)>;

/// Read-only projection of the queue state for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackView {
    pub now_playing: Option<SequenceIndex>,
    pub muted: bool,
    pub pending: usize,
}

/// Orders generated clips for one-at-a-time playback.
///
/// Invariants:
/// - at most one clip is playing at any instant;
/// - entries are enqueued only once their message holds a ready clip, and
///   play in enqueue (= completion) order;
/// - mute stops in-flight audio immediately but keeps the pending queue,
///   which drains again on unmute.
pub struct PlaybackQueue {
    pending: VecDeque<SequenceIndex>,
    now_playing: Option<SequenceIndex>,
    muted: bool,
    /// Guards against re-entrant `play_next` while a start is in progress.
    processing: bool,
    store: Box<dyn ClipStore>,
    sink: Box<dyn AudioSink>,
    callback: Option<PlaybackCallback>,
}

impl PlaybackQueue {
    pub fn new(store: Box<dyn ClipStore>, sink: Box<dyn AudioSink>) -> Self {
        Self {
            pending: VecDeque::new(),
            now_playing: None,
            muted: false,
            processing: false,
            store,
            sink,
            callback: None,
        }
    }

    /// Set a callback for playback events.
    pub fn with_callback(mut self, callback: PlaybackCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Ask the clip store to synthesize audio for a message.
    ///
    /// No-op if the message already has a generation in flight, a ready
    /// clip, or a failed attempt. Returns whether a request was issued.
    pub fn request_audio(&mut self, log: &mut MessageLog, request: ClipRequest) -> bool {
        if !log.mark_generating(request.sequence) {
            debug!(
                sequence = request.sequence,
                "audio already requested, ignoring"
            );
            return false;
        }
        self.store.generate(request);
        true
    }

    /// Dispatch a collaborator notification.
    pub fn handle_event(&mut self, log: &mut MessageLog, event: AudioEvent) {
        match event {
            AudioEvent::ClipReady { sequence, clip } => self.clip_ready(log, sequence, clip),
            AudioEvent::ClipFailed { sequence } => {
                // Failure is silent to the queue: the message never plays.
                if log.mark_failed(sequence) {
                    debug!(sequence, "clip generation failed");
                }
            }
            AudioEvent::PlaybackEnded { sequence } => self.playback_done(log, sequence, false),
            AudioEvent::PlaybackError { sequence } => self.playback_done(log, sequence, true),
        }
    }

    fn clip_ready(&mut self, log: &mut MessageLog, sequence: SequenceIndex, clip: AudioClip) {
        if !log.mark_ready(sequence, clip) {
            // The message was never marked generating (or already settled);
            // a clip for it must not enter the queue.
            return;
        }
        // Enqueue even while muted: the clip is deferred, not dropped.
        self.pending.push_back(sequence);
        debug!(sequence, pending = self.pending.len(), "clip enqueued");
        if self.now_playing.is_none() {
            self.play_next(log);
        }
    }

    /// Start the next pending clip, if any.
    ///
    /// Re-entrant calls while a start is already in progress are dropped,
    /// not queued; every legitimate state change routes through an
    /// ended/error event that calls this again. Returns immediately when
    /// muted, when the queue is empty, or when a clip is already playing.
    /// An entry whose message no longer holds a ready clip is skipped, and
    /// an entry the sink refuses to start is treated like a playback error:
    /// one attempt, then advance.
    pub fn play_next(&mut self, log: &mut MessageLog) {
        if self.processing || self.now_playing.is_some() {
            return;
        }
        self.processing = true;
        while !self.muted {
            let Some(sequence) = self.pending.pop_front() else {
                break;
            };
            let Some(clip) = log.get(sequence).and_then(|m| m.clip().cloned()) else {
                warn!(sequence, "queued message has no clip, skipping");
                continue;
            };
            match self.sink.start(sequence, &clip) {
                Ok(()) => {
                    self.now_playing = Some(sequence);
                    self.emit(PlaybackEvent::Started { sequence });
                    break;
                }
                Err(err) => {
                    warn!(sequence, error = %err, "clip failed to start, advancing");
                    self.emit(PlaybackEvent::Failed { sequence });
                    continue;
                }
            }
        }
        self.processing = false;
    }

    fn playback_done(&mut self, log: &mut MessageLog, sequence: SequenceIndex, failed: bool) {
        if self.now_playing != Some(sequence) {
            // End/error notification for a clip that was already stopped or
            // replaced; the queue has moved on.
            debug!(sequence, "stale playback notification ignored");
            return;
        }
        self.now_playing = None;
        if failed {
            warn!(sequence, "playback error, advancing");
            self.emit(PlaybackEvent::Failed { sequence });
        } else {
            self.emit(PlaybackEvent::Finished { sequence });
        }
        self.play_next(log);
    }

    /// Mute or unmute playback.
    ///
    /// Muting stops in-flight audio immediately and holds the pending
    /// queue; unmuting resumes draining it. The clip that was cut off is
    /// not replayed.
    pub fn set_muted(&mut self, log: &mut MessageLog, muted: bool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        self.emit(PlaybackEvent::MuteChanged { muted });
        if muted {
            self.sink.stop();
            if let Some(sequence) = self.now_playing.take() {
                self.emit(PlaybackEvent::Stopped { sequence });
            }
        } else {
            self.play_next(log);
        }
    }

    /// Replay a specific message right now.
    ///
    /// Stops whatever is playing and starts the requested clip without
    /// touching the pending FIFO, so subsequently auto-triggered clips keep
    /// their order.
    pub fn play_specific(
        &mut self,
        log: &MessageLog,
        sequence: SequenceIndex,
    ) -> Result<(), PodcastError> {
        let clip = log
            .get(sequence)
            .and_then(|m| m.clip().cloned())
            .ok_or(PodcastError::ClipUnavailable(sequence))?;
        self.sink.stop();
        if let Some(current) = self.now_playing.take() {
            self.emit(PlaybackEvent::Stopped { sequence: current });
        }
        self.sink.start(sequence, &clip)?;
        self.now_playing = Some(sequence);
        self.emit(PlaybackEvent::Started { sequence });
        Ok(())
    }

    pub fn view(&self) -> PlaybackView {
        PlaybackView {
            now_playing: self.now_playing,
            muted: self.muted,
            pending: self.pending.len(),
        }
    }

    pub fn now_playing(&self) -> Option<SequenceIndex> {
        self.now_playing
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// True when nothing is playing and nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.now_playing.is_none() && self.pending.is_empty()
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }

    #[cfg(test)]
    fn force_enqueue(&mut self, sequence: SequenceIndex) {
        self.pending.push_back(sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Speaker;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingStore(Rc<RefCell<Vec<SequenceIndex>>>);

    impl ClipStore for RecordingStore {
        fn generate(&self, request: ClipRequest) {
            self.0.borrow_mut().push(request.sequence);
        }
    }

    #[derive(Default)]
    struct SinkState {
        started: Vec<SequenceIndex>,
        stops: u32,
        fail_on: Option<SequenceIndex>,
    }

    struct TestSink(Rc<RefCell<SinkState>>);

    impl AudioSink for TestSink {
        fn start(&mut self, sequence: SequenceIndex, _clip: &AudioClip) -> Result<(), PodcastError> {
            let mut state = self.0.borrow_mut();
            if state.fail_on == Some(sequence) {
                return Err(PodcastError::AudioError("device refused clip".into()));
            }
            state.started.push(sequence);
            Ok(())
        }

        fn stop(&mut self) {
            self.0.borrow_mut().stops += 1;
        }
    }

    struct Fixture {
        queue: PlaybackQueue,
        log: MessageLog,
        sink: Rc<RefCell<SinkState>>,
        requests: Rc<RefCell<Vec<SequenceIndex>>>,
    }

    fn fixture(messages: usize) -> Fixture {
        let sink = Rc::new(RefCell::new(SinkState::default()));
        let requests = Rc::new(RefCell::new(Vec::new()));
        let queue = PlaybackQueue::new(
            Box::new(RecordingStore(requests.clone())),
            Box::new(TestSink(sink.clone())),
        );
        let mut log = MessageLog::new();
        for i in 0..messages {
            log.append(
                Speaker::Figure("napoleon".into()),
                "Napoleon",
                None,
                format!("line {i}"),
            );
        }
        Fixture {
            queue,
            log,
            sink,
            requests,
        }
    }

    fn clip() -> AudioClip {
        AudioClip::new(vec![0.25; 240], 24000)
    }

    fn request(f: &mut Fixture, sequence: SequenceIndex) -> bool {
        f.queue.request_audio(
            &mut f.log,
            ClipRequest {
                sequence,
                text: format!("line {sequence}"),
                voice: "af_sky".into(),
            },
        )
    }

    fn ready(f: &mut Fixture, sequence: SequenceIndex) {
        f.queue
            .handle_event(&mut f.log, AudioEvent::ClipReady { sequence, clip: clip() });
    }

    fn ended(f: &mut Fixture, sequence: SequenceIndex) {
        f.queue
            .handle_event(&mut f.log, AudioEvent::PlaybackEnded { sequence });
    }

    #[test]
    fn test_plays_in_completion_order() {
        let mut f = fixture(3);
        for i in 0..3 {
            assert!(request(&mut f, i));
        }
        // Generation completes out of request order: B, A, C.
        ready(&mut f, 1);
        ready(&mut f, 0);
        ready(&mut f, 2);
        ended(&mut f, 1);
        ended(&mut f, 0);
        ended(&mut f, 2);
        assert_eq!(f.sink.borrow().started, vec![1, 0, 2]);
        assert!(f.queue.is_idle());
    }

    #[test]
    fn test_at_most_one_playing() {
        let mut f = fixture(2);
        request(&mut f, 0);
        request(&mut f, 1);
        ready(&mut f, 0);
        ready(&mut f, 1);
        // Second clip waits in the queue while the first plays.
        assert_eq!(f.sink.borrow().started, vec![0]);
        assert_eq!(f.queue.now_playing(), Some(0));
        assert_eq!(f.queue.view().pending, 1);
        ended(&mut f, 0);
        assert_eq!(f.queue.now_playing(), Some(1));
    }

    #[test]
    fn test_duplicate_request_is_noop() {
        let mut f = fixture(1);
        assert!(request(&mut f, 0));
        assert!(!request(&mut f, 0));
        assert_eq!(*f.requests.borrow(), vec![0]);
    }

    #[test]
    fn test_failed_generation_never_plays() {
        let mut f = fixture(2);
        request(&mut f, 0);
        request(&mut f, 1);
        f.queue
            .handle_event(&mut f.log, AudioEvent::ClipFailed { sequence: 0 });
        ready(&mut f, 1);
        ended(&mut f, 1);
        assert_eq!(f.sink.borrow().started, vec![1]);
        assert!(f.queue.is_idle());
    }

    #[test]
    fn test_unsolicited_clip_is_not_enqueued() {
        let mut f = fixture(1);
        // Ready without a preceding request: state machine rejects it.
        ready(&mut f, 0);
        assert!(f.queue.is_idle());
        assert!(f.sink.borrow().started.is_empty());
    }

    #[test]
    fn test_playback_error_advances_exactly_once() {
        let mut f = fixture(3);
        for i in 0..3 {
            request(&mut f, i);
            ready(&mut f, i);
        }
        assert_eq!(f.sink.borrow().started, vec![0]);
        f.queue
            .handle_event(&mut f.log, AudioEvent::PlaybackError { sequence: 0 });
        // Exactly one attempt on the next entry, none skipped.
        assert_eq!(f.sink.borrow().started, vec![0, 1]);
        ended(&mut f, 1);
        assert_eq!(f.sink.borrow().started, vec![0, 1, 2]);
    }

    #[test]
    fn test_sink_refusal_skips_to_next_entry() {
        let mut f = fixture(3);
        f.sink.borrow_mut().fail_on = Some(1);
        for i in 0..3 {
            request(&mut f, i);
            ready(&mut f, i);
        }
        ended(&mut f, 0);
        // Entry 1 failed to start; entry 2 plays instead.
        assert_eq!(f.sink.borrow().started, vec![0, 2]);
        assert_eq!(f.queue.now_playing(), Some(2));
    }

    #[test]
    fn test_mute_stops_and_retains_pending() {
        let mut f = fixture(3);
        for i in 0..3 {
            request(&mut f, i);
            ready(&mut f, i);
        }
        assert_eq!(f.queue.now_playing(), Some(0));
        f.queue.set_muted(&mut f.log, true);
        assert_eq!(f.sink.borrow().stops, 1);
        assert_eq!(f.queue.now_playing(), None);
        // Pending clips survive the mute.
        assert_eq!(f.queue.view().pending, 2);

        // The stop makes the medium report an end; it must not restart anything.
        ended(&mut f, 0);
        ended(&mut f, 0);
        assert_eq!(f.sink.borrow().started, vec![0]);

        f.queue.set_muted(&mut f.log, false);
        // Draining resumes with the retained queue; the cut-off clip is gone.
        assert_eq!(f.sink.borrow().started, vec![0, 1]);
        ended(&mut f, 1);
        assert_eq!(f.sink.borrow().started, vec![0, 1, 2]);
    }

    #[test]
    fn test_clip_ready_while_muted_is_deferred() {
        let mut f = fixture(1);
        request(&mut f, 0);
        f.queue.set_muted(&mut f.log, true);
        ready(&mut f, 0);
        assert!(f.sink.borrow().started.is_empty());
        assert_eq!(f.queue.view().pending, 1);
        f.queue.set_muted(&mut f.log, false);
        assert_eq!(f.sink.borrow().started, vec![0]);
    }

    #[test]
    fn test_stale_end_event_is_ignored() {
        let mut f = fixture(2);
        request(&mut f, 0);
        request(&mut f, 1);
        ready(&mut f, 0);
        ready(&mut f, 1);
        ended(&mut f, 5);
        assert_eq!(f.queue.now_playing(), Some(0));
        assert_eq!(f.sink.borrow().started, vec![0]);
    }

    #[test]
    fn test_entry_without_clip_is_skipped() {
        let mut f = fixture(2);
        request(&mut f, 1);
        // Sequence 0 sneaks into the queue without ever becoming ready.
        f.queue.force_enqueue(0);
        ready(&mut f, 1);
        assert_eq!(f.sink.borrow().started, vec![1]);
    }

    #[test]
    fn test_play_specific_interrupts_without_touching_fifo() {
        let mut f = fixture(3);
        for i in 0..3 {
            request(&mut f, i);
            ready(&mut f, i);
        }
        assert_eq!(f.queue.now_playing(), Some(0));
        f.queue.play_specific(&f.log, 2).unwrap();
        assert_eq!(f.sink.borrow().stops, 1);
        assert_eq!(f.queue.now_playing(), Some(2));
        // The FIFO still holds 1 and 2 in order.
        ended(&mut f, 2);
        assert_eq!(f.queue.now_playing(), Some(1));
        ended(&mut f, 1);
        assert_eq!(f.queue.now_playing(), Some(2));
    }

    #[test]
    fn test_play_specific_requires_ready_clip() {
        let mut f = fixture(1);
        request(&mut f, 0);
        let err = f.queue.play_specific(&f.log, 0).unwrap_err();
        assert!(matches!(err, PodcastError::ClipUnavailable(0)));
        assert!(f.sink.borrow().started.is_empty());
    }

    #[test]
    fn test_callback_observes_lifecycle() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let seen = events.clone();
        let sink = Rc::new(RefCell::new(SinkState::default()));
        let requests = Rc::new(RefCell::new(Vec::new()));
        let mut queue = PlaybackQueue::new(
            Box::new(RecordingStore(requests)),
            Box::new(TestSink(sink)),
        )
        .with_callback(Box::new(move |event| seen.borrow_mut().push(event)));

        let mut log = MessageLog::new();
        log.append(Speaker::Narrator, "Narrator", None, "welcome");
        queue.request_audio(
            &mut log,
            ClipRequest {
                sequence: 0,
                text: "welcome".into(),
                voice: "af_sky".into(),
            },
        );
        queue.handle_event(
            &mut log,
            AudioEvent::ClipReady {
                sequence: 0,
                clip: clip(),
            },
        );
        queue.handle_event(&mut log, AudioEvent::PlaybackEnded { sequence: 0 });

        assert_eq!(
            *events.borrow(),
            vec![
                PlaybackEvent::Started { sequence: 0 },
                PlaybackEvent::Finished { sequence: 0 },
            ]
        );
    }
}
