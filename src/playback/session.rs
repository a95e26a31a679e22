// Playback session - One loaded track set and its play/pause bookkeeping
// Owns the live schedule and the progress poll

use super::track::TrackData;
use crate::audio::backend::{AudioBackend, BackendError, ClockTime, Tick, TimerId, TriggerId};
use crate::sequencer::note::NoteEvent;
use std::cell::Cell;
use std::rc::Rc;

/// The triggers registered by one `play()`
///
/// Triggers check a shared armed flag before sounding, so a part that has
/// been stopped stays silent even if the backend still delivers its
/// callbacks.
pub struct ScheduledPart {
    armed: Rc<Cell<bool>>,
    triggers: Vec<TriggerId>,
}

impl ScheduledPart {
    /// Register one trigger per event at `clock_base + (time - offset)`
    pub fn schedule(
        backend: &Rc<dyn AudioBackend>,
        events: &[NoteEvent],
        offset: f64,
        clock_base: ClockTime,
    ) -> Self {
        let armed = Rc::new(Cell::new(true));

        let triggers = events
            .iter()
            .map(|&event| {
                let armed = Rc::clone(&armed);
                let target = Rc::downgrade(backend);
                backend.schedule_at(
                    clock_base + (event.time - offset),
                    Box::new(move |at| {
                        if !armed.get() {
                            return;
                        }
                        if let Some(backend) = target.upgrade() {
                            backend.synthesize(event.pitch, event.duration, event.velocity, at);
                        }
                    }),
                )
            })
            .collect();

        Self { armed, triggers }
    }

    /// Silence the part without giving its triggers back
    pub fn stop(&self) {
        self.armed.set(false);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Stop and release every trigger; reports the first failure after
    /// attempting all of them
    pub fn dispose(self, backend: &dyn AudioBackend) -> Result<(), BackendError> {
        self.stop();

        let mut first_error = None;
        for id in self.triggers {
            if let Err(e) = backend.release(id) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Repeating progress timer, cancellable as a handle
pub struct ProgressPoll {
    timer: TimerId,
}

impl ProgressPoll {
    pub fn start(backend: &dyn AudioBackend, interval: f64, tick: Tick) -> Self {
        Self {
            timer: backend.start_timer(interval, tick),
        }
    }

    pub fn cancel(self, backend: &dyn AudioBackend) {
        backend.cancel_timer(self.timer);
    }
}

/// Progress report sent to the observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub current_time: f64,
    pub total_time: f64,
    /// current_time / total_time, capped at 1
    pub progress: f64,
}

/// A loaded set of tracks plus offset bookkeeping
pub struct PlaybackSession {
    pub(crate) tracks: TrackData,
    pub(crate) total_duration: f64,
    /// Where playback resumes from, in track time
    pub(crate) pause_offset: f64,
    /// Wall-clock time that corresponds to track time zero
    pub(crate) anchor: ClockTime,
    pub(crate) scheduled: Option<ScheduledPart>,
    pub(crate) poll: Option<ProgressPoll>,
}

impl PlaybackSession {
    pub fn new(tracks: TrackData) -> Self {
        let total_duration = tracks.total_duration();
        Self {
            tracks,
            total_duration,
            pause_offset: 0.0,
            anchor: 0.0,
            scheduled: None,
            poll: None,
        }
    }

    pub fn tracks(&self) -> &TrackData {
        &self.tracks
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn pause_offset(&self) -> f64 {
        self.pause_offset
    }

    /// Elapsed track time given the current wall clock
    pub fn elapsed(&self, now: ClockTime) -> f64 {
        now - self.anchor
    }

    pub fn progress(&self, now: ClockTime) -> Progress {
        let current_time = self.elapsed(now);
        let progress = if self.total_duration > 0.0 {
            (current_time / self.total_duration).min(1.0)
        } else {
            1.0
        };

        Progress {
            current_time,
            total_time: self.total_duration,
            progress,
        }
    }
}
