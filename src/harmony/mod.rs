//! The harmony model — keys, scale-degree chords, and their transformation
//! operators, plus the roman-numeral parser, the Markov progression
//! generator, and the absolute-beat harmony timeline.

pub mod chord;
pub mod hierarchy;
pub mod markov;
pub mod pitch;
pub mod roman;
pub mod scale;
pub mod timeline;

pub use chord::ChordInScale;
pub use hierarchy::{Level, MelodyNote, Perturbation, PitchHierarchy};
pub use markov::MarkovChords;
pub use pitch::{parse_note_name, PitchClass};
pub use scale::{Key, Scale};
pub use timeline::{HarmonyEvent, HarmonyOp, HarmonyTimeline};
