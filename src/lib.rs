// MyMusic Rhythm - Library exports for the demo binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod playback;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::{AudioBackend, BackendError, VirtualBackend};
pub use config::{ConfigError, EngineConfig};
pub use playback::{
    PlaybackError, PlaybackResult, Progress, Track, TrackData, Transport, TransportSnapshot,
    TransportState,
};
pub use sequencer::{
    Arrangement, NoteEvent, Pattern, PatternCompiler, PatternError, PatternLibrary, PatternName,
    Section, Tempo, drum_name, select_pattern, should_add_fill,
};
