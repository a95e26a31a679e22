// Audio backend - Capabilities the playback transport schedules against
// Clock, one-shot triggers, repeating timers and voice synthesis

/// Clock time in seconds
pub type ClockTime = f64;

/// Handle to a one-shot trigger registered on the transport clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(pub u64);

/// Handle to a repeating timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// One-shot callback; receives the transport-clock time it was scheduled for
pub type Trigger = Box<dyn FnOnce(ClockTime)>;

/// Repeating timer callback
pub type Tick = Box<dyn FnMut()>;

/// Audio backend errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Audio backend is not ready")]
    NotReady,

    #[error("Audio device unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to release trigger {0:?}: {1}")]
    ReleaseFailed(TriggerId, String),
}

/// Everything the transport needs from the audio side
///
/// All callbacks run on a single event loop, one at a time and to completion.
/// Implementations must not invoke callbacks from inside these methods; they
/// fire only while the backend drives its own loop. The transport clock and
/// its pending-trigger queue are shared by everyone holding the backend.
pub trait AudioBackend {
    /// Bring the device up; must be called before playback
    fn prepare(&self) -> Result<(), BackendError>;

    fn is_ready(&self) -> bool;

    /// Monotonic wall clock
    fn now(&self) -> ClockTime;

    /// Current position of the transport clock
    fn clock_position(&self) -> ClockTime;

    fn is_clock_running(&self) -> bool;

    fn start_clock(&self);

    /// Stop the transport clock and rewind it to zero
    fn stop_clock(&self);

    /// Drop every trigger that has not fired yet, whoever registered it
    fn cancel_all_pending(&self);

    /// Fire `trigger` once when the transport clock reaches `at`
    fn schedule_at(&self, at: ClockTime, trigger: Trigger) -> TriggerId;

    /// Release a trigger; a trigger that already fired or was cancelled is
    /// not an error
    fn release(&self, id: TriggerId) -> Result<(), BackendError>;

    /// Call `tick` every `interval` seconds of wall time until cancelled
    fn start_timer(&self, interval: f64, tick: Tick) -> TimerId;

    fn cancel_timer(&self, id: TimerId);

    /// Sound a voice
    fn synthesize(&self, pitch: u8, duration: f64, velocity: f32, at: ClockTime);

    /// All notes off
    fn silence_all(&self);
}
