// Playback module - Transport, sessions and track data
// Schedules note events against the audio backend's shared clock

pub mod session;
pub mod track;
pub mod transport;

pub use track::{SMF_MAGIC, Track, TrackData};
pub use session::Progress;
pub use transport::{DEFAULT_PROGRESS_INTERVAL, Transport, TransportSnapshot, TransportState};

use crate::audio::backend::BackendError;
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Invalid track data: {0}")]
    InvalidFormat(String),

    #[error("Audio backend not initialized")]
    NotInitialized,

    #[error("No track loaded")]
    NoTrackLoaded,

    #[error("Audio backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
