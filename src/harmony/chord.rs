//! Chords expressed as scale degrees.
//!
//! A [`ChordInScale`] is key-independent: it names which degrees of the
//! current scale sound, plus a voicing rotation. Chromatic chords (from the
//! roman-numeral parser) additionally carry per-tone semitone offsets.

use serde::{Deserialize, Serialize};

/// A chord as scale-degree indices plus an inversion.
///
/// `degrees` is non-empty and ordered; entries may be negative or exceed the
/// scale size (resolution wraps octaves). `offsets`, when present, is a
/// parallel list of chromatic semitone adjustments per tone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordInScale {
    pub degrees: Vec<i32>,
    pub inversion: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets: Option<Vec<i32>>,
}

impl ChordInScale {
    pub fn new(degrees: Vec<i32>, inversion: i32) -> Self {
        Self {
            degrees,
            inversion,
            offsets: None,
        }
    }

    /// Root-position triad on the tonic.
    pub fn tonic_triad() -> Self {
        Self::new(vec![0, 2, 4], 0)
    }

    /// Attach chromatic per-tone offsets. An all-zero set collapses to none.
    pub fn with_offsets(mut self, offsets: Vec<i32>) -> Self {
        debug_assert_eq!(offsets.len(), self.degrees.len());
        self.offsets = if offsets.iter().all(|&o| o == 0) {
            None
        } else {
            Some(offsets)
        };
        self
    }

    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }

    /// Degrees in voiced (bass-first) order: `degrees` rotated left by
    /// `inversion mod len`. Always a permutation of `degrees`.
    pub fn voiced_degrees(&self) -> Vec<i32> {
        rotated(&self.degrees, self.inversion)
    }

    /// Chromatic offsets in the same voiced order, one per tone.
    pub fn voiced_offsets(&self) -> Vec<i32> {
        match &self.offsets {
            Some(offsets) => rotated(offsets, self.inversion),
            None => vec![0; self.degrees.len()],
        }
    }

    /// Diatonic transposition: add `n` to every degree (I → ii is `+1`).
    pub fn transpose(&mut self, n: i32) {
        for d in &mut self.degrees {
            *d += n;
        }
    }

    /// Rotate the voicing: increment the inversion by `n`.
    pub fn rotate(&mut self, n: i32) {
        self.inversion += n;
    }
}

fn rotated(values: &[i32], inversion: i32) -> Vec<i32> {
    let n = values.len();
    let shift = inversion.rem_euclid(n as i32) as usize;
    let mut out = Vec::with_capacity(n);
    out.extend_from_slice(&values[shift..]);
    out.extend_from_slice(&values[..shift]);
    out
}
