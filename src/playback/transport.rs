// Transport - Play/pause/stop/seek state machine over a loaded track set
// Schedules note triggers on the backend clock and polls playback progress

use super::session::{PlaybackSession, Progress, ProgressPoll, ScheduledPart};
use super::track::TrackData;
use super::{PlaybackError, PlaybackResult};
use crate::audio::backend::AudioBackend;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// Default progress poll interval (one display frame)
pub const DEFAULT_PROGRESS_INTERVAL: f64 = 1.0 / 60.0;

/// Progress observer callback
pub type ProgressObserver = Box<dyn FnMut(Progress)>;

/// End-of-playback observer callback
pub type EndObserver = Box<dyn FnMut()>;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TransportState {
    #[default]
    Idle,
    Playing,
    Paused,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, TransportState::Paused)
    }

    /// Check if transport is idle (nothing scheduled, offset at zero)
    pub fn is_idle(&self) -> bool {
        matches!(self, TransportState::Idle)
    }
}

/// Point-in-time view of the transport, for UIs and tests
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransportSnapshot {
    pub initialized: bool,
    pub playing: bool,
    pub paused: bool,
    pub current_time: f64,
    pub duration: f64,
    pub has_track: bool,
}

struct TransportInner {
    backend: Rc<dyn AudioBackend>,
    state: TransportState,
    session: Option<PlaybackSession>,
    progress_interval: f64,
    /// Bumped on every successful `play()`
    generation: u64,
    on_progress: Option<ProgressObserver>,
    on_end: Option<EndObserver>,
}

impl TransportInner {
    /// Cancel the poll and dispose the scheduled part, keeping the session
    fn release_handles(&mut self) {
        let backend = Rc::clone(&self.backend);
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(poll) = session.poll.take() {
            poll.cancel(&*backend);
        }
        if let Some(part) = session.scheduled.take() {
            if let Err(e) = part.dispose(&*backend) {
                log::warn!("Failed to dispose scheduled playback: {}", e);
            }
        }
    }
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        self.release_handles();
    }
}

/// Playback transport
///
/// A cheap handle: clones share the same state. The backend is injected so
/// several transports can run against one clock. All methods must be called
/// from the backend's event loop thread; observers may call back into the
/// transport.
#[derive(Clone)]
pub struct Transport {
    inner: Rc<RefCell<TransportInner>>,
}

impl Transport {
    /// Create a transport bound to `backend`
    pub fn new(backend: Rc<dyn AudioBackend>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TransportInner {
                backend,
                state: TransportState::Idle,
                session: None,
                progress_interval: DEFAULT_PROGRESS_INTERVAL,
                generation: 0,
                on_progress: None,
                on_end: None,
            })),
        }
    }

    /// Set the progress poll interval in seconds
    pub fn with_progress_interval(self, interval: f64) -> Self {
        if interval.is_finite() && interval > 0.0 {
            self.inner.borrow_mut().progress_interval = interval;
        } else {
            log::warn!("Ignoring invalid progress interval {}", interval);
        }
        self
    }

    pub fn progress_interval(&self) -> f64 {
        self.inner.borrow().progress_interval
    }

    /// Prepare the audio backend
    pub fn initialize(&self) -> PlaybackResult<()> {
        let backend = Rc::clone(&self.inner.borrow().backend);
        backend.prepare()?;
        log::debug!("Audio backend ready");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().backend.is_ready()
    }

    pub fn set_progress_observer(&self, observer: impl FnMut(Progress) + 'static) {
        self.inner.borrow_mut().on_progress = Some(Box::new(observer));
    }

    pub fn set_end_observer(&self, observer: impl FnMut() + 'static) {
        self.inner.borrow_mut().on_end = Some(Box::new(observer));
    }

    /// Load a Standard MIDI File, replacing any current session
    pub fn load(&self, bytes: &[u8]) -> PlaybackResult<()> {
        let tracks = TrackData::from_smf_bytes(bytes)?;
        self.load_tracks(tracks)
    }

    /// Load already decoded tracks, replacing any current session
    pub fn load_tracks(&self, tracks: TrackData) -> PlaybackResult<()> {
        tracks.validate()?;
        self.stop_playback();

        let session = PlaybackSession::new(tracks);
        log::info!(
            "Loaded {} events ({:.2}s)",
            session.tracks().event_count(),
            session.total_duration()
        );

        let mut inner = self.inner.borrow_mut();
        inner.session = Some(session);
        inner.state = TransportState::Idle;
        Ok(())
    }

    /// Start or resume playback from the current offset
    pub fn play(&self) -> PlaybackResult<()> {
        let weak = Rc::downgrade(&self.inner);
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        if !inner.backend.is_ready() {
            return Err(PlaybackError::NotInitialized);
        }
        let backend = Rc::clone(&inner.backend);
        let interval = inner.progress_interval;
        let session = inner.session.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
        if inner.state.is_playing() {
            return Ok(());
        }

        let offset = session.pause_offset;
        session.anchor = backend.now() - offset;

        if let Some(previous) = session.scheduled.take() {
            if let Err(e) = previous.dispose(&*backend) {
                log::warn!("Failed to dispose previous playback: {}", e);
            }
        }
        if let Some(poll) = session.poll.take() {
            poll.cancel(&*backend);
        }

        let events = session.tracks.events_from(offset);
        let part = ScheduledPart::schedule(&backend, &events, offset, backend.clock_position());
        log::debug!("Scheduled {} events from {:.3}s", part.len(), offset);
        session.scheduled = Some(part);

        if !backend.is_clock_running() {
            backend.start_clock();
        }

        session.poll = Some(ProgressPoll::start(
            &*backend,
            interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Transport { inner }.poll_progress();
                }
            }),
        ));

        inner.generation += 1;
        inner.state = TransportState::Playing;
        Ok(())
    }

    /// Pause playback, remembering the position
    pub fn pause(&self) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if !inner.state.is_playing() {
            return;
        }
        let backend = Rc::clone(&inner.backend);

        if let Some(session) = inner.session.as_mut() {
            session.pause_offset = session
                .elapsed(backend.now())
                .clamp(0.0, session.total_duration);

            backend.cancel_all_pending();
            backend.stop_clock();

            if let Some(part) = session.scheduled.as_ref() {
                part.stop();
            }
            if let Some(poll) = session.poll.take() {
                poll.cancel(&*backend);
            }
            log::debug!("Paused at {:.3}s", session.pause_offset);
        }

        inner.state = TransportState::Paused;
    }

    /// Stop playback and rewind to the start; safe to call at any time
    pub fn stop_playback(&self) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        if let Some(session) = inner.session.as_mut() {
            session.pause_offset = 0.0;
        }
        if inner.state.is_idle() {
            return;
        }

        let backend = Rc::clone(&inner.backend);
        backend.cancel_all_pending();
        backend.stop_clock();
        inner.release_handles();
        backend.silence_all();

        inner.state = TransportState::Idle;
        log::debug!("Playback stopped");
    }

    /// Move the playhead; playback continues from `time` if playing
    pub fn seek(&self, time: f64) -> PlaybackResult<()> {
        let (target, was_playing) = {
            let inner = self.inner.borrow();
            let session = inner.session.as_ref().ok_or(PlaybackError::NoTrackLoaded)?;
            let time = if time.is_nan() { 0.0 } else { time };
            (
                time.clamp(0.0, session.total_duration),
                inner.state.is_playing(),
            )
        };

        if was_playing {
            self.stop_playback();
        }

        if let Some(session) = self.inner.borrow_mut().session.as_mut() {
            session.pause_offset = target;
        }

        if was_playing {
            self.play()?;
        }
        Ok(())
    }

    pub fn state(&self) -> TransportState {
        self.inner.borrow().state
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        let inner = self.inner.borrow();
        let (current_time, duration) = match inner.session.as_ref() {
            Some(session) if inner.state.is_playing() => (
                session.elapsed(inner.backend.now()),
                session.total_duration,
            ),
            Some(session) => (session.pause_offset, session.total_duration),
            None => (0.0, 0.0),
        };

        TransportSnapshot {
            initialized: inner.backend.is_ready(),
            playing: inner.state.is_playing(),
            paused: inner.state.is_paused(),
            current_time,
            duration,
            has_track: inner.session.is_some(),
        }
    }

    /// Loaded tracks, if any
    pub fn tracks(&self) -> Option<TrackData> {
        self.inner
            .borrow()
            .session
            .as_ref()
            .map(|session| session.tracks().clone())
    }

    /// One progress poll: notify, then stop at the end of the track
    ///
    /// Driven by the poll timer while playing; does nothing otherwise.
    pub fn poll_progress(&self) {
        let (progress, generation) = {
            let inner = self.inner.borrow();
            if !inner.state.is_playing() {
                return;
            }
            let Some(session) = inner.session.as_ref() else {
                return;
            };
            (session.progress(inner.backend.now()), inner.generation)
        };

        self.notify_progress(progress);

        if progress.progress >= 1.0 {
            // The observer may already have paused, stopped or restarted us
            let unchanged = {
                let inner = self.inner.borrow();
                inner.state.is_playing() && inner.generation == generation
            };
            if unchanged {
                self.stop_playback();
                log::info!("Playback finished");
                self.notify_end();
            }
        }
    }

    fn notify_progress(&self, progress: Progress) {
        let observer = self.inner.borrow_mut().on_progress.take();
        if let Some(mut observer) = observer {
            observer(progress);
            let mut inner = self.inner.borrow_mut();
            if inner.on_progress.is_none() {
                inner.on_progress = Some(observer);
            }
        }
    }

    fn notify_end(&self) {
        let observer = self.inner.borrow_mut().on_end.take();
        if let Some(mut observer) = observer {
            observer();
            let mut inner = self.inner.borrow_mut();
            if inner.on_end.is_none() {
                inner.on_end = Some(observer);
            }
        }
    }
}
