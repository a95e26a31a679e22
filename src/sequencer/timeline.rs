// Timeline - Musical time representation
// Handles conversion between beats, bars, and real time (seconds)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every pattern is written in 4/4: a bar is four quarter-note beats
pub const BEATS_PER_BAR: f64 = 4.0;

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo
    /// BPM must be finite and strictly positive
    pub fn new(bpm: f64) -> Self {
        assert!(Self::is_valid_bpm(bpm), "BPM must be finite and > 0");
        Self { bpm }
    }

    /// Fallible constructor for user-supplied values
    pub fn try_new(bpm: f64) -> Option<Self> {
        Self::is_valid_bpm(bpm).then_some(Self { bpm })
    }

    fn is_valid_bpm(bpm: f64) -> bool {
        bpm.is_finite() && bpm > 0.0
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one 4/4 bar in seconds
    pub fn bar_duration_seconds(&self) -> f64 {
        self.beat_duration_seconds() * BEATS_PER_BAR
    }

    /// Microseconds per quarter note, as stored in a MIDI tempo meta event
    pub fn micros_per_beat(&self) -> u32 {
        (60_000_000.0 / self.bpm).round() as u32
    }

    /// Inverse of [`Tempo::micros_per_beat`]
    pub fn from_micros_per_beat(micros: u32) -> Option<Self> {
        if micros == 0 {
            return None;
        }
        Self::try_new(60_000_000.0 / micros as f64)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl TryFrom<f64> for Tempo {
    type Error = String;

    fn try_from(bpm: f64) -> Result<Self, Self::Error> {
        Self::try_new(bpm).ok_or_else(|| format!("invalid tempo: {} BPM", bpm))
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}
