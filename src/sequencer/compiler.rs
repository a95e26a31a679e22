// Pattern compiler - Expands named patterns into time-stamped drum hits
// Pure apart from the tempo, which can change between compilations

use crate::sequencer::note::{NoteEvent, sort_by_time};
use crate::sequencer::pattern::{PatternLibrary, PatternName};
use crate::sequencer::section::{Arrangement, Section, select_pattern, should_add_fill};
use crate::sequencer::timeline::Tempo;

/// Default length of a generated hit in seconds (drums do not sustain)
pub const DEFAULT_HIT_DURATION: f64 = 0.1;

/// Share of the nominal velocity removed by the end of an outro
const OUTRO_FADE_DEPTH: f64 = 0.6;

/// Most pattern hits a single section may expand to
pub const MAX_SECTION_HITS: usize = 1_000_000;

/// Transition fill in the last bar: (beat offset, pitch, velocity)
/// Snare pickup, tom run down, then layered hits on beats 3 and 4.
const FILL_HITS: [(f64, u8, u8); 8] = [
    (0.0, 38, 90),
    (0.5, 38, 95),
    (1.0, 50, 100),
    (1.5, 47, 105),
    (2.0, 45, 110),
    (2.0, 36, 115),
    (3.0, 49, 127),
    (3.0, 36, 127),
];

/// Compiles song sections into drum note events
#[derive(Debug, Clone)]
pub struct PatternCompiler {
    library: PatternLibrary,
    tempo: Tempo,
    hit_duration: f64,
}

impl PatternCompiler {
    /// Create a compiler over a library at the given tempo
    pub fn new(library: PatternLibrary, tempo: Tempo) -> Self {
        Self {
            library,
            tempo,
            hit_duration: DEFAULT_HIT_DURATION,
        }
    }

    /// Override the length of generated hits
    pub fn with_hit_duration(mut self, hit_duration: f64) -> Self {
        if hit_duration.is_finite() && hit_duration > 0.0 {
            self.hit_duration = hit_duration;
        } else {
            log::warn!("Ignoring invalid hit duration {}", hit_duration);
        }
        self
    }

    /// Get tempo
    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Set tempo; applies to the next compilation only
    pub fn set_tempo(&mut self, tempo: Tempo) {
        log::debug!("Compiler tempo {} -> {}", self.tempo, tempo);
        self.tempo = tempo;
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    pub fn hit_duration(&self) -> f64 {
        self.hit_duration
    }

    /// Compile one section starting at `start_time` (seconds)
    ///
    /// The pattern is tiled from the section start and cropped at the section
    /// end. Outro hits fade linearly towards 40% of their velocity, and
    /// verse-like sections close with a fill in their last bar. The result is
    /// sorted by time. A missing library entry produces no pattern hits, and
    /// so does a section that would tile to more than [`MAX_SECTION_HITS`].
    pub fn generate(&self, section: &Section, start_time: f64) -> Vec<NoteEvent> {
        if !section.duration.is_finite()
            || section.duration <= 0.0
            || !start_time.is_finite()
            || start_time < 0.0
        {
            log::warn!(
                "Cannot compile section {} at {}s: invalid time span",
                section,
                start_time
            );
            return Vec::new();
        }

        let name = select_pattern(&section.kind);
        let mut events = self.pattern_hits(name, section, start_time);

        if should_add_fill(section) {
            events.extend(self.fill_hits(section, start_time));
        }

        sort_by_time(&mut events);
        events
    }

    /// Compile a whole arrangement, sections placed back to back from zero
    pub fn compile_arrangement(&self, arrangement: &Arrangement) -> Vec<NoteEvent> {
        let mut events: Vec<NoteEvent> = arrangement
            .timeline()
            .flat_map(|(start, section)| self.generate(section, start))
            .collect();

        sort_by_time(&mut events);
        events
    }

    fn pattern_hits(&self, name: PatternName, section: &Section, start_time: f64) -> Vec<NoteEvent> {
        let Some(pattern) = self.library.get(name).filter(|p| !p.is_empty()) else {
            log::debug!("No '{}' pattern available for section {}", name, section);
            return Vec::new();
        };

        let beat_duration = self.tempo.beat_duration_seconds();
        let pattern_duration = pattern.duration_seconds(&self.tempo);
        let section_end = start_time + section.duration;
        let repeats = (section.duration / pattern_duration).ceil();

        // Compare in floating point: the repeat count may not fit in a usize
        if !(repeats * pattern.note_count() as f64 <= MAX_SECTION_HITS as f64) {
            log::warn!(
                "Section {} at {} BPM would expand to more than {} hits; skipping '{}' pattern",
                section,
                self.tempo.bpm(),
                MAX_SECTION_HITS,
                name
            );
            return Vec::new();
        }

        let repeats = repeats as usize;
        let mut events = Vec::with_capacity(repeats * pattern.note_count());
        for repeat in 0..repeats {
            let repeat_start = start_time + repeat as f64 * pattern_duration;

            for note in &pattern.notes {
                let time = repeat_start + (note.beat - 1.0) * beat_duration;
                if time >= section_end {
                    continue;
                }

                let mut velocity = note.velocity as f64 / 127.0;
                if name == PatternName::Outro {
                    let fade_progress = (time - start_time) / section.duration;
                    velocity *= 1.0 - OUTRO_FADE_DEPTH * fade_progress;
                }

                events.push(NoteEvent::new(
                    note.pitch,
                    time,
                    self.hit_duration,
                    velocity as f32,
                ));
            }
        }

        events
    }

    /// The fill sits in the section's final bar regardless of how the pattern
    /// tiled. Sections shorter than a bar start the fill at the section start
    /// and crop it at the section end.
    fn fill_hits(&self, section: &Section, start_time: f64) -> Vec<NoteEvent> {
        let beat_duration = self.tempo.beat_duration_seconds();
        let section_end = start_time + section.duration;
        let fill_start = (section_end - self.tempo.bar_duration_seconds()).max(start_time);

        FILL_HITS
            .iter()
            .map(|&(offset, pitch, velocity)| {
                NoteEvent::new(
                    pitch,
                    fill_start + offset * beat_duration,
                    self.hit_duration,
                    velocity as f32 / 127.0,
                )
            })
            .filter(|event| event.time < section_end)
            .collect()
    }
}

impl Default for PatternCompiler {
    fn default() -> Self {
        Self::new(PatternLibrary::builtin(), Tempo::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::pattern::{Pattern, PatternNote};

    const EPSILON: f64 = 1e-9;

    fn single_note_library(name: PatternName, bars: u32, notes: Vec<PatternNote>) -> PatternLibrary {
        let mut library = PatternLibrary::new();
        library.insert(name, Pattern::new(bars, notes).unwrap()).unwrap();
        library
    }

    #[test]
    fn test_intro_scenario() {
        let compiler = PatternCompiler::new(PatternLibrary::builtin(), Tempo::new(120.0));
        let events = compiler.generate(&Section::new("intro", 8.0), 0.0);

        assert_eq!(events.len(), 2);
        assert!((events[0].time - 0.5).abs() < EPSILON);
        assert!((events[0].velocity - 30.0 / 127.0).abs() < 1e-6);
        assert!((events[1].time - 1.5).abs() < EPSILON);
        assert!((events[1].velocity - 25.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn test_pattern_is_tiled_and_cropped() {
        let library = single_note_library(
            PatternName::Chorus,
            1,
            vec![PatternNote::new(1.0, 36, 127), PatternNote::new(4.0, 38, 127)],
        );
        let compiler = PatternCompiler::new(library, Tempo::new(120.0));

        // 5s = 2.5 bars: repeats = 3, the third bar is cut after beat 2
        let events = compiler.generate(&Section::new("chorus", 5.0), 10.0);
        let times: Vec<f64> = events.iter().map(|e| e.time).collect();

        assert_eq!(times, vec![10.0, 11.5, 12.0, 13.5, 14.0]);
    }

    #[test]
    fn test_outro_fades() {
        let library = single_note_library(
            PatternName::Outro,
            1,
            vec![PatternNote::new(1.0, 36, 127), PatternNote::new(3.0, 36, 127)],
        );
        let compiler = PatternCompiler::new(library, Tempo::new(120.0));
        let events = compiler.generate(&Section::new("outro", 4.0), 0.0);

        // Hits at 0, 1, 2, 3 seconds; fade = 1 - 0.6 * t / 4
        let expected = [1.0, 0.85, 0.7, 0.55];
        assert_eq!(events.len(), expected.len());
        for (event, expected) in events.iter().zip(expected) {
            assert!((event.velocity as f64 - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_non_outro_does_not_fade() {
        let library = single_note_library(PatternName::Bridge, 1, vec![PatternNote::new(1.0, 51, 127)]);
        let compiler = PatternCompiler::new(library, Tempo::new(120.0));
        let events = compiler.generate(&Section::new("interlude", 8.0), 0.0);

        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.velocity == 1.0));
    }

    #[test]
    fn test_verse_gets_fill_in_last_bar() {
        let compiler = PatternCompiler::new(PatternLibrary::new(), Tempo::new(120.0));
        let events = compiler.generate(&Section::new("verse", 8.0), 4.0);

        assert_eq!(events.len(), 8);
        let offsets: Vec<f64> = events.iter().map(|e| e.time - 10.0).collect();
        assert_eq!(offsets, vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 1.5, 1.5]);
        assert!(events.iter().all(|e| e.time >= 10.0 && e.time < 12.0));
    }

    #[test]
    fn test_fill_is_not_faded_or_shared() {
        let compiler = PatternCompiler::new(PatternLibrary::new(), Tempo::new(90.0));

        let fill = compiler.generate(&Section::new("buildup", 16.0), 0.0);
        assert_eq!(fill.len(), 8);
        assert!((fill[7].velocity - 1.0).abs() < 1e-6);

        assert!(compiler.generate(&Section::new("outro", 16.0), 0.0).is_empty());
        assert!(compiler.generate(&Section::new("chorus", 16.0), 0.0).is_empty());
    }

    #[test]
    fn test_short_section_fill_is_clamped() {
        let compiler = PatternCompiler::new(PatternLibrary::new(), Tempo::new(120.0));

        // Half a bar: the fill starts at the section start and is cut at its end
        let events = compiler.generate(&Section::new("verse", 1.0), 3.0);
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.time >= 3.0 && e.time < 4.0));
    }

    #[test]
    fn test_missing_pattern_yields_nothing() {
        let compiler = PatternCompiler::new(PatternLibrary::new(), Tempo::default());
        assert!(compiler.generate(&Section::new("chorus", 8.0), 0.0).is_empty());
    }

    #[test]
    fn test_invalid_section_yields_nothing() {
        let compiler = PatternCompiler::default();
        assert!(compiler.generate(&Section::new("chorus", 0.0), 0.0).is_empty());
        assert!(compiler.generate(&Section::new("chorus", -4.0), 0.0).is_empty());
        assert!(compiler.generate(&Section::new("chorus", f64::NAN), 0.0).is_empty());
    }

    #[test]
    fn test_negative_start_yields_nothing() {
        let compiler = PatternCompiler::default();
        assert!(compiler.generate(&Section::new("chorus", 8.0), -2.0).is_empty());
        assert!(compiler.generate(&Section::new("verse", 8.0), -0.5).is_empty());
        assert!(!compiler.generate(&Section::new("chorus", 8.0), 0.0).is_empty());
    }

    #[test]
    fn test_oversized_section_degrades() {
        let fast = PatternCompiler::new(PatternLibrary::builtin(), Tempo::new(1e300));
        assert!(fast.generate(&Section::new("chorus", 8.0), 0.0).is_empty());

        let long = PatternCompiler::new(PatternLibrary::builtin(), Tempo::new(120.0));
        assert!(long.generate(&Section::new("chorus", 1e300), 0.0).is_empty());
        assert!(long.generate(&Section::new("verse", 1e300), 0.0).len() <= FILL_HITS.len());

        // 1e9 BPM over 8s would be hundreds of millions of hits
        let very_fast = PatternCompiler::new(PatternLibrary::builtin(), Tempo::new(1e9));
        assert!(very_fast.generate(&Section::new("chorus", 8.0), 0.0).is_empty());

        // Long but reasonable sections still compile
        let hour = long.generate(&Section::new("chorus", 3600.0), 0.0);
        assert!(!hour.is_empty());
        assert!(hour.len() <= MAX_SECTION_HITS);
    }

    #[test]
    fn test_set_tempo_applies_to_next_generate() {
        let mut compiler = PatternCompiler::new(PatternLibrary::builtin(), Tempo::new(120.0));
        let section = Section::new("intro", 8.0);

        let before = compiler.generate(&section, 0.0);
        compiler.set_tempo(Tempo::new(60.0));
        let after = compiler.generate(&section, 0.0);

        assert!((before[0].time - 0.5).abs() < EPSILON);
        assert!((after[0].time - 1.0).abs() < EPSILON);
        assert_eq!(compiler.tempo().bpm(), 60.0);
    }

    #[test]
    fn test_hit_duration() {
        let compiler = PatternCompiler::default().with_hit_duration(0.05);
        let events = compiler.generate(&Section::new("chorus", 2.0), 0.0);

        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.duration == 0.05));

        let unchanged = PatternCompiler::default().with_hit_duration(-1.0);
        assert_eq!(unchanged.hit_duration(), DEFAULT_HIT_DURATION);
    }

    #[test]
    fn test_compile_arrangement() {
        let compiler = PatternCompiler::new(PatternLibrary::builtin(), Tempo::new(120.0));
        let arrangement = Arrangement::new(vec![
            Section::new("intro", 8.0),
            Section::new("verse", 8.0),
        ]);

        let events = compiler.compile_arrangement(&arrangement);
        let intro = compiler.generate(&arrangement.sections[0], 0.0);
        let verse = compiler.generate(&arrangement.sections[1], 8.0);

        assert_eq!(events.len(), intro.len() + verse.len());
        assert!(events.windows(2).all(|w| w[0].time <= w[1].time));
        assert!(events.iter().all(|e| e.time < 16.0));
    }
}
