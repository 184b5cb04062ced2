//! Pitch-class spelling and absolute note-name parsing.
//!
//! Pitch classes are semitones above C (0–11). Spelling uses a fixed
//! flat-preference table so that chromatic roots produced by transposition
//! and tonicization print as "Eb" rather than "D#".

use serde::{Deserialize, Serialize};

/// Flat-preference spelling for each of the 12 pitch classes.
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// A pitch class: semitones above C, always in `0..12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PitchClass(u8);

impl PitchClass {
    /// Construct from any semitone count, wrapping into `0..12`.
    pub fn new(semitones: i32) -> Self {
        Self(semitones.rem_euclid(12) as u8)
    }

    /// Semitones above C.
    pub fn semitones(self) -> u8 {
        self.0
    }

    /// Shift by `n` semitones, wrapping.
    pub fn shifted(self, n: i32) -> Self {
        Self::new(self.0 as i32 + n)
    }

    /// Flat-preference name, e.g. `"Eb"`.
    pub fn name(self) -> &'static str {
        PITCH_CLASS_NAMES[self.0 as usize]
    }

    /// Parse a pitch-class name: letter plus optional `#`/`b`.
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let base = letter_semitones(chars.next()?)?;
        let accidental = match chars.next() {
            None => 0,
            Some('#') => 1,
            Some('b') => -1,
            Some(_) => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some(Self::new(base + accidental))
    }
}

impl std::fmt::Display for PitchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn letter_semitones(letter: char) -> Option<i32> {
    match letter {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// Parse an absolute note name into a MIDI note number.
///
/// Format: `<letter><optional accidental><octave>`
/// - Letter: C, D, E, F, G, A, B
/// - Accidental: # (sharp) or b (flat)
/// - Octave: -1 to 9 (C4 = middle C = MIDI 60)
pub fn parse_note_name(name: &str) -> Option<u8> {
    let chars: Vec<char> = name.chars().collect();
    if chars.is_empty() {
        return None;
    }

    let base = letter_semitones(chars[0])?;

    let mut i = 1;
    let accidental: i32 = if i < chars.len() && chars[i] == '#' {
        i += 1;
        1
    } else if i < chars.len() && chars[i] == 'b' {
        i += 1;
        -1
    } else {
        0
    };

    // Rest should be octave number (possibly negative)
    let octave_str: String = chars[i..].iter().collect();
    let octave: i32 = octave_str.parse().ok()?;

    midi_pitch(base + accidental, octave)
}

/// Combine semitones-above-C with an octave into a MIDI note number.
///
/// C-1 = 0, C4 = 60, A4 = 69. Returns `None` outside 0–127.
pub fn midi_pitch(semitones: i32, octave: i32) -> Option<u8> {
    let midi = (octave + 1) * 12 + semitones;
    if (0..=127).contains(&midi) {
        Some(midi as u8)
    } else {
        None
    }
}
