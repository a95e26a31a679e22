// Pattern - Tempo-relative drum templates
// A pattern is written in beats and only becomes time-stamped when compiled

use crate::sequencer::timeline::{BEATS_PER_BAR, Tempo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Built-in library, embedded at compile time
const BUILTIN_PATTERNS: &str = include_str!("../../assets/patterns.ron");

/// Pattern library errors
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Invalid(String),
}

/// The five pattern slots a library can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternName {
    Intro,
    Verse,
    Chorus,
    Bridge,
    Outro,
}

impl PatternName {
    pub const ALL: [PatternName; 5] = [
        PatternName::Intro,
        PatternName::Verse,
        PatternName::Chorus,
        PatternName::Bridge,
        PatternName::Outro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternName::Intro => "intro",
            PatternName::Verse => "verse",
            PatternName::Chorus => "chorus",
            PatternName::Bridge => "bridge",
            PatternName::Outro => "outro",
        }
    }
}

impl fmt::Display for PatternName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternName {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| PatternError::Invalid(format!("unknown pattern name '{}'", s)))
    }
}

/// One hit inside a pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternNote {
    /// 1-indexed beat position; fractional values are subdivisions
    pub beat: f64,

    /// MIDI note number (0-127)
    pub pitch: u8,

    /// MIDI velocity (0-127)
    pub velocity: u8,
}

impl PatternNote {
    pub fn new(beat: f64, pitch: u8, velocity: u8) -> Self {
        Self {
            beat,
            pitch,
            velocity,
        }
    }
}

/// An immutable drum pattern spanning a whole number of 4/4 bars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Length of the pattern in bars
    /// Determines when the pattern repeats
    pub bars: u32,

    /// All hits, in no particular order
    pub notes: Vec<PatternNote>,
}

impl Pattern {
    /// Create a pattern, rejecting malformed content
    pub fn new(bars: u32, notes: Vec<PatternNote>) -> Result<Self, PatternError> {
        let pattern = Self { bars, notes };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Check bar count and every note against the pattern bounds
    pub fn validate(&self) -> Result<(), PatternError> {
        if self.bars == 0 {
            return Err(PatternError::Invalid(
                "pattern length must be at least 1 bar".to_string(),
            ));
        }

        let last_beat = 1.0 + BEATS_PER_BAR * self.bars as f64;
        for note in &self.notes {
            if !note.beat.is_finite() || note.beat < 1.0 || note.beat >= last_beat {
                return Err(PatternError::Invalid(format!(
                    "beat {} outside pattern of {} bar(s)",
                    note.beat, self.bars
                )));
            }
            if note.pitch > 127 {
                return Err(PatternError::Invalid(format!(
                    "MIDI pitch {} must be 0-127",
                    note.pitch
                )));
            }
            if note.velocity > 127 {
                return Err(PatternError::Invalid(format!(
                    "MIDI velocity {} must be 0-127",
                    note.velocity
                )));
            }
        }

        Ok(())
    }

    /// Length of one pass through the pattern, in seconds
    pub fn duration_seconds(&self, tempo: &Tempo) -> f64 {
        tempo.bar_duration_seconds() * self.bars as f64
    }

    /// Get the number of notes
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Check if pattern is empty
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Named patterns, loaded once and then only read
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    patterns: HashMap<PatternName, Pattern>,
}

impl PatternLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// The library shipped with the crate
    ///
    /// A broken embedded file degrades to an empty library; compilation then
    /// simply yields no pattern hits.
    pub fn builtin() -> Self {
        match Self::from_ron_str(BUILTIN_PATTERNS) {
            Ok(library) => library,
            Err(e) => {
                log::error!("Built-in pattern library failed to parse: {}", e);
                Self::new()
            }
        }
    }

    /// Parse a library from RON (`{ "verse": (bars: 1, notes: [...]) }`)
    ///
    /// Only the outer map has to parse. Entries that do not describe a valid
    /// pattern are skipped with a warning.
    pub fn from_ron_str(ron_data: &str) -> Result<Self, PatternError> {
        let entries: BTreeMap<String, ron::Value> = ron::from_str(ron_data)?;
        Ok(Self::from_entries(entries, |value| {
            value.into_rust::<Pattern>().map_err(|e| e.to_string())
        }))
    }

    /// Parse a library from JSON
    pub fn from_json_str(json_data: &str) -> Result<Self, PatternError> {
        let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(json_data)?;
        Ok(Self::from_entries(entries, |value| {
            serde_json::from_value::<Pattern>(value).map_err(|e| e.to_string())
        }))
    }

    /// Load a library file; `.json` is read as JSON, anything else as RON
    pub fn load(path: &Path) -> Result<Self, PatternError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_ron_str(&content),
        }
    }

    /// Keep the well-formed entries, skip the rest with a warning
    fn from_entries<V>(
        entries: BTreeMap<String, V>,
        decode: impl Fn(V) -> Result<Pattern, String>,
    ) -> Self {
        let mut library = Self::new();

        for (key, value) in entries {
            let name = match key.parse::<PatternName>() {
                Ok(name) => name,
                Err(e) => {
                    log::warn!("Skipping pattern entry: {}", e);
                    continue;
                }
            };

            let pattern = match decode(value) {
                Ok(pattern) => pattern,
                Err(e) => {
                    log::warn!("Skipping pattern '{}': {}", name, e);
                    continue;
                }
            };

            if let Err(e) = library.insert(name, pattern) {
                log::warn!("Skipping pattern '{}': {}", name, e);
            }
        }

        library
    }

    /// Add or replace a pattern
    pub fn insert(&mut self, name: PatternName, pattern: Pattern) -> Result<(), PatternError> {
        pattern.validate()?;
        self.patterns.insert(name, pattern);
        Ok(())
    }

    /// Look up a pattern by name
    pub fn get(&self, name: PatternName) -> Option<&Pattern> {
        self.patterns.get(&name)
    }

    /// Names present in the library, in declaration order
    pub fn names(&self) -> Vec<PatternName> {
        PatternName::ALL
            .into_iter()
            .filter(|name| self.patterns.contains_key(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
