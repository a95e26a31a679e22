// Note representation for the sequencer
// A note event is a concrete, time-stamped hit ready for playback

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single time-stamped note
///
/// Produced fresh by the pattern compiler and consumed by the playback
/// transport. Times and durations are in seconds, velocity is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI note number (0-127); percussion uses the General MIDI drum map
    pub pitch: u8,

    /// Absolute start time in seconds
    pub time: f64,

    /// Duration in seconds
    pub duration: f64,

    /// Velocity normalized to [0, 1]
    pub velocity: f32,
}

impl NoteEvent {
    /// Creates a new note event
    pub fn new(pitch: u8, time: f64, duration: f64, velocity: f32) -> Self {
        assert!(pitch <= 127, "MIDI pitch must be 0-127");
        Self {
            pitch,
            time,
            duration,
            velocity: velocity.clamp(0.0, 1.0),
        }
    }

    /// Time at which the note stops sounding
    pub fn end_time(&self) -> f64 {
        self.time + self.duration
    }

    /// Velocity scaled back to the MIDI range (1-127 so a hit never becomes a note-off)
    pub fn midi_velocity(&self) -> u8 {
        ((self.velocity * 127.0).round() as u8).clamp(1, 127)
    }

    /// Ordering by start time, used to keep sequences sorted
    pub fn cmp_time(&self, other: &Self) -> Ordering {
        self.time.total_cmp(&other.time)
    }
}

/// Sort events by start time, keeping the relative order of ties
pub fn sort_by_time(events: &mut [NoteEvent]) {
    events.sort_by(NoteEvent::cmp_time);
}

/// General MIDI percussion name for a pitch, or the plain note name
pub fn drum_name(pitch: u8) -> String {
    let name = match pitch {
        35 => "Acoustic Bass Drum",
        36 => "Bass Drum",
        37 => "Side Stick",
        38 => "Snare",
        39 => "Hand Clap",
        40 => "Electric Snare",
        41 => "Low Floor Tom",
        42 => "Closed Hi-Hat",
        43 => "High Floor Tom",
        44 => "Pedal Hi-Hat",
        45 => "Low Tom",
        46 => "Open Hi-Hat",
        47 => "Low-Mid Tom",
        48 => "Hi-Mid Tom",
        49 => "Crash Cymbal",
        50 => "High Tom",
        51 => "Ride Cymbal",
        52 => "Chinese Cymbal",
        53 => "Ride Bell",
        54 => "Tambourine",
        55 => "Splash Cymbal",
        56 => "Cowbell",
        57 => "Crash Cymbal 2",
        59 => "Ride Cymbal 2",
        _ => return note_name(pitch),
    };
    name.to_string()
}

fn note_name(pitch: u8) -> String {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}
