// Sequencer module - Pattern library and section compiler
// Turns song sections into time-stamped drum hits

pub mod compiler;
pub mod note;
pub mod pattern;
pub mod section;
pub mod timeline;

pub use compiler::{DEFAULT_HIT_DURATION, MAX_SECTION_HITS, PatternCompiler};
pub use note::{NoteEvent, drum_name, sort_by_time};
pub use pattern::{Pattern, PatternError, PatternLibrary, PatternName, PatternNote};
pub use section::{Arrangement, Section, select_pattern, should_add_fill};
pub use timeline::{BEATS_PER_BAR, Tempo};
