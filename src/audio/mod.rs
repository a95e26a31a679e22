// Audio module - Backend capabilities and the virtual clock implementation

pub mod backend;
pub mod virtual_clock;

pub use backend::{AudioBackend, BackendError, ClockTime, TimerId, TriggerId};
pub use virtual_clock::{RenderedNote, VirtualBackend};
