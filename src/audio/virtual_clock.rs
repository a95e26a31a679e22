// Virtual clock backend - Deterministic event loop driven by `advance`
// Used by the tests and by the demo binary (which advances it in real time)

use super::backend::{AudioBackend, BackendError, ClockTime, Tick, TimerId, Trigger, TriggerId};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Shortest accepted timer interval (keeps `advance` from spinning)
const MIN_TIMER_INTERVAL: f64 = 1e-3;

/// A voice the backend was asked to synthesize
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedNote {
    pub pitch: u8,
    pub duration: f64,
    pub velocity: f32,
    /// Transport-clock time the note was scheduled for
    pub at: ClockTime,
    /// Wall time at which it actually sounded
    pub wall_time: ClockTime,
}

struct PendingTrigger {
    id: TriggerId,
    at: ClockTime,
    trigger: Trigger,
}

struct RepeatingTimer {
    interval: f64,
    next_due: ClockTime,
    /// Taken out while the tick runs
    tick: Option<Tick>,
}

/// What fires next during `advance`
enum Due {
    Trigger { wall: ClockTime, index: usize },
    Timer { wall: ClockTime, id: TimerId },
}

#[derive(Default)]
struct VirtualState {
    ready: bool,
    wall: ClockTime,
    clock_running: bool,
    clock_position: ClockTime,
    next_id: u64,
    triggers: Vec<PendingTrigger>,
    timers: BTreeMap<TimerId, RepeatingTimer>,
    rendered: Vec<RenderedNote>,
    silence_count: usize,
    fail_release: bool,
}

impl VirtualState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Move wall time forward, dragging the transport clock along if running
    fn move_to(&mut self, wall: ClockTime) {
        if wall <= self.wall {
            return;
        }
        if self.clock_running {
            self.clock_position += wall - self.wall;
        }
        self.wall = wall;
    }

    /// Earliest callback due at or before `target` (wall time)
    /// Triggers order by scheduled time then registration; they win ties with timers.
    fn next_due(&self, target: ClockTime) -> Option<Due> {
        let trigger = if self.clock_running {
            self.triggers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.at.total_cmp(&b.at).then(a.id.cmp(&b.id)))
                .map(|(index, pending)| {
                    let wall = self.wall + (pending.at - self.clock_position).max(0.0);
                    Due::Trigger { wall, index }
                })
        } else {
            None
        };

        let timer = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.tick.is_some())
            .min_by(|(_, a), (_, b)| a.next_due.total_cmp(&b.next_due))
            .map(|(&id, timer)| Due::Timer {
                wall: timer.next_due.max(self.wall),
                id,
            });

        let due = match (trigger, timer) {
            (Some(t), Some(m)) => {
                if t.wall() <= m.wall() {
                    Some(t)
                } else {
                    Some(m)
                }
            }
            (t, m) => t.or(m),
        };

        due.filter(|due| due.wall() <= target)
    }
}

impl Due {
    fn wall(&self) -> ClockTime {
        match self {
            Due::Trigger { wall, .. } | Due::Timer { wall, .. } => *wall,
        }
    }
}

/// Single-threaded backend with a manually advanced clock
///
/// Nothing happens until [`VirtualBackend::advance`] is called; callbacks then
/// fire in time order with the backend's internal state unlocked, so they may
/// freely call back into it.
#[derive(Default)]
pub struct VirtualBackend {
    state: RefCell<VirtualState>,
}

impl VirtualBackend {
    /// Create a backend that still needs [`AudioBackend::prepare`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an already prepared backend
    pub fn new_ready() -> Self {
        let backend = Self::new();
        backend.state.borrow_mut().ready = true;
        backend
    }

    /// Advance wall time by `seconds`, firing everything that falls due
    pub fn advance(&self, seconds: f64) {
        let target = self.state.borrow().wall + seconds.max(0.0);

        loop {
            let due = self.state.borrow().next_due(target);
            match due {
                None => {
                    self.state.borrow_mut().move_to(target);
                    break;
                }
                Some(Due::Trigger { wall, index }) => {
                    let pending = {
                        let mut state = self.state.borrow_mut();
                        state.move_to(wall);
                        state.triggers.remove(index)
                    };
                    (pending.trigger)(pending.at);
                }
                Some(Due::Timer { wall, id }) => {
                    let tick = {
                        let mut state = self.state.borrow_mut();
                        state.move_to(wall);
                        state.timers.get_mut(&id).and_then(|timer| {
                            timer.next_due += timer.interval;
                            timer.tick.take()
                        })
                    };

                    if let Some(mut tick) = tick {
                        tick();
                        // The tick may have cancelled its own timer
                        if let Some(timer) = self.state.borrow_mut().timers.get_mut(&id) {
                            timer.tick = Some(tick);
                        }
                    }
                }
            }
        }
    }

    /// Notes synthesized so far
    pub fn rendered(&self) -> Vec<RenderedNote> {
        self.state.borrow().rendered.clone()
    }

    /// Drain the synthesized-note log
    pub fn take_rendered(&self) -> Vec<RenderedNote> {
        std::mem::take(&mut self.state.borrow_mut().rendered)
    }

    /// How many times all voices were silenced
    pub fn silence_count(&self) -> usize {
        self.state.borrow().silence_count
    }

    /// Triggers waiting on the transport clock
    pub fn pending_triggers(&self) -> usize {
        self.state.borrow().triggers.len()
    }

    /// Repeating timers still registered
    pub fn active_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Make every subsequent [`AudioBackend::release`] fail
    pub fn set_fail_release(&self, fail: bool) {
        self.state.borrow_mut().fail_release = fail;
    }
}

impl AudioBackend for VirtualBackend {
    fn prepare(&self) -> Result<(), BackendError> {
        self.state.borrow_mut().ready = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    fn now(&self) -> ClockTime {
        self.state.borrow().wall
    }

    fn clock_position(&self) -> ClockTime {
        self.state.borrow().clock_position
    }

    fn is_clock_running(&self) -> bool {
        self.state.borrow().clock_running
    }

    fn start_clock(&self) {
        self.state.borrow_mut().clock_running = true;
    }

    fn stop_clock(&self) {
        let mut state = self.state.borrow_mut();
        state.clock_running = false;
        state.clock_position = 0.0;
    }

    fn cancel_all_pending(&self) {
        self.state.borrow_mut().triggers.clear();
    }

    fn schedule_at(&self, at: ClockTime, trigger: Trigger) -> TriggerId {
        let mut state = self.state.borrow_mut();
        let id = TriggerId(state.next_id());
        state.triggers.push(PendingTrigger { id, at, trigger });
        id
    }

    fn release(&self, id: TriggerId) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        if state.fail_release {
            return Err(BackendError::ReleaseFailed(id, "device closed".to_string()));
        }
        state.triggers.retain(|pending| pending.id != id);
        Ok(())
    }

    fn start_timer(&self, interval: f64, tick: Tick) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = TimerId(state.next_id());
        let interval = interval.max(MIN_TIMER_INTERVAL);
        let next_due = state.wall + interval;
        state.timers.insert(
            id,
            RepeatingTimer {
                interval,
                next_due,
                tick: Some(tick),
            },
        );
        id
    }

    fn cancel_timer(&self, id: TimerId) {
        self.state.borrow_mut().timers.remove(&id);
    }

    fn synthesize(&self, pitch: u8, duration: f64, velocity: f32, at: ClockTime) {
        let mut state = self.state.borrow_mut();
        log::trace!("synth pitch {} vel {:.2} at {:.3}s", pitch, velocity, at);
        let wall_time = state.wall;
        state.rendered.push(RenderedNote {
            pitch,
            duration,
            velocity,
            at,
            wall_time,
        });
    }

    fn silence_all(&self) {
        self.state.borrow_mut().silence_count += 1;
    }
}
