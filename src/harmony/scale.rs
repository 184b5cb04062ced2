//! Scales and keys.
//!
//! A [`Scale`] is an ordered list of intervals-from-root (semitones); a
//! [`Key`] pairs a root pitch class with a scale. Both are immutable values.
//! Modal rotation (the `t` operator at scale level) lives on
//! [`PitchHierarchy`](super::hierarchy::PitchHierarchy); this module supplies
//! the named-scale table it matches against.

use serde::{Deserialize, Serialize};

use super::pitch::PitchClass;

/// Named scales recognized by modal rotation and key parsing.
///
/// Order matters only for readability; lookup is by interval content.
pub const NAMED_SCALES: [(&str, &[u8]); 9] = [
    ("major", &[0, 2, 4, 5, 7, 9, 11]),
    ("dorian", &[0, 2, 3, 5, 7, 9, 10]),
    ("phrygian", &[0, 1, 3, 5, 7, 8, 10]),
    ("lydian", &[0, 2, 4, 6, 7, 9, 11]),
    ("mixolydian", &[0, 2, 4, 5, 7, 9, 10]),
    ("minor", &[0, 2, 3, 5, 7, 8, 10]),
    ("locrian", &[0, 1, 3, 4, 6, 8, 10]),
    ("harmonic minor", &[0, 2, 3, 5, 7, 8, 11]),
    ("melodic minor", &[0, 2, 3, 5, 7, 9, 11]),
];

/// An ordered sequence of intervals-from-root, size >= 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    intervals: Vec<u8>,
    name: Option<String>,
}

impl Scale {
    /// Look up a named scale from [`NAMED_SCALES`].
    pub fn named(name: &str) -> Option<Self> {
        NAMED_SCALES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(n, intervals)| Self {
                intervals: intervals.to_vec(),
                name: Some((*n).to_string()),
            })
    }

    /// Build an unnamed scale from raw intervals. Returns `None` when empty.
    pub fn from_intervals(intervals: Vec<u8>) -> Option<Self> {
        if intervals.is_empty() {
            return None;
        }
        let name = NAMED_SCALES
            .iter()
            .find(|(_, iv)| *iv == intervals.as_slice())
            .map(|(n, _)| (*n).to_string());
        Some(Self { intervals, name })
    }

    /// The major scale, the default harmonic frame.
    pub fn major() -> Self {
        Self::named("major").unwrap()
    }

    pub fn intervals(&self) -> &[u8] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Step sizes between consecutive degrees, closing the octave.
    ///
    /// Major → `[2, 2, 1, 2, 2, 2, 1]`.
    pub fn steps(&self) -> Vec<u8> {
        let n = self.intervals.len();
        let mut steps = Vec::with_capacity(n);
        for i in 0..n {
            let next = if i + 1 < n {
                self.intervals[i + 1]
            } else {
                12
            };
            steps.push(next - self.intervals[i]);
        }
        steps
    }

    /// Semitones above the root for an arbitrary (possibly negative or
    /// out-of-range) scale degree, with octave wrap.
    pub fn degree_semitones(&self, degree: i32) -> i32 {
        let n = self.intervals.len() as i32;
        let octave_shift = degree.div_euclid(n);
        let idx = degree.rem_euclid(n) as usize;
        self.intervals[idx] as i32 + 12 * octave_shift
    }
}

/// A root pitch class plus a named scale. Immutable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub root: PitchClass,
    pub scale: Scale,
}

impl Key {
    pub fn new(root: PitchClass, scale: Scale) -> Self {
        Self { root, scale }
    }

    /// Parse `"Eb major"`-style key names.
    pub fn parse(text: &str) -> Option<Self> {
        let (root, scale) = text.split_once(' ')?;
        Some(Self {
            root: PitchClass::parse(root)?,
            scale: Scale::named(scale.trim())?,
        })
    }

    /// `"C major"`, or `"C [0, 1, 2]"` for unnamed scales.
    pub fn label(&self) -> String {
        match self.scale.name() {
            Some(name) => format!("{} {}", self.root, name),
            None => format!("{} {:?}", self.root, self.scale.intervals()),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}
