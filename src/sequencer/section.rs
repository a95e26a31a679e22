// Section - Song-section descriptors supplied by the arrangement
// Maps free-form section tags onto the pattern library

use crate::sequencer::pattern::PatternName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Section tags that close with a drum fill into the next section
const FILL_SECTIONS: [&str; 3] = ["verse", "pre-chorus", "buildup"];

/// One section of a song, e.g. `{ type: "chorus", duration: 16.0 }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Free-form section tag ("verse", "pre-chorus", "interlude", ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Length of the section in seconds
    pub duration: f64,
}

impl Section {
    pub fn new(kind: impl Into<String>, duration: f64) -> Self {
        Self {
            kind: kind.into(),
            duration,
        }
    }

    /// Pattern used to render this section
    pub fn pattern(&self) -> PatternName {
        select_pattern(&self.kind)
    }

    /// Whether this section closes with a fill
    pub fn has_fill(&self) -> bool {
        should_add_fill(self)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}s)", self.kind, self.duration)
    }
}

/// Parses the `type:seconds` shorthand used on the command line
impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, duration) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <type>:<seconds>, got '{}'", s))?;
        let duration: f64 = duration
            .trim()
            .parse()
            .map_err(|e| format!("invalid duration in '{}': {}", s, e))?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(format!("section duration must be > 0, got {}", duration));
        }
        Ok(Self::new(kind.trim(), duration))
    }
}

/// Map a section tag to a pattern
///
/// Total: every tag resolves, unknown tags fall back to the verse groove.
pub fn select_pattern(section_type: &str) -> PatternName {
    match section_type {
        "intro" => PatternName::Intro,
        "verse" | "pre-chorus" => PatternName::Verse,
        "chorus" | "buildup" => PatternName::Chorus,
        "interlude" | "bridge" => PatternName::Bridge,
        "outro" => PatternName::Outro,
        _ => PatternName::Verse,
    }
}

/// True exactly for sections that lead into something bigger
pub fn should_add_fill(section: &Section) -> bool {
    FILL_SECTIONS.contains(&section.kind.as_str())
}

/// Sections played back to back, starting at time zero
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub sections: Vec<Section>,
}

impl Arrangement {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// Each section paired with its absolute start time
    pub fn timeline(&self) -> impl Iterator<Item = (f64, &Section)> {
        self.sections.iter().scan(0.0, |start, section| {
            let current = *start;
            *start += section.duration.max(0.0);
            Some((current, section))
        })
    }

    /// Total length in seconds
    pub fn duration(&self) -> f64 {
        self.sections.iter().map(|s| s.duration.max(0.0)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
