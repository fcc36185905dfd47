pub mod note_event_times;
pub mod parser;
pub mod piano_roll;

pub use piano_roll::{PianoRollExtractor, PianoRolls};
