//! Stochastic chord-progression generation.
//!
//! A 14-state Markov chain over tonal chord symbols with a fixed, asymmetric,
//! unnormalized weight table. Sampling uses the weighted race draw: each
//! candidate edge computes `-ln(U) / weight` for a fresh uniform `U` and the
//! minimum wins — equivalent to weighted sampling without building a CDF.
//! The chain is stateful, infinite, and not restartable; construct a new one
//! to start over at `I`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::chord::ChordInScale;
use super::pitch::PitchClass;
use super::roman;
use super::scale::{Key, Scale};

/// Chain state labels. Index order matches [`TRANSITIONS`].
pub const STATES: [&str; 14] = [
    "I", "vi", "IV", "ii", "V", "iii", "I6", "IV6", "ii6", "V6", "iii6", "vi6", "viio6", "I64",
];

/// Weighted edges out of each state, by state label.
const TRANSITIONS: [&[(&str, f64)]; 14] = [
    // I
    &[
        ("vi", 3.0),
        ("IV", 4.0),
        ("ii", 2.0),
        ("V", 3.0),
        ("iii", 1.0),
        ("IV6", 2.0),
        ("vi6", 1.0),
        ("I6", 2.0),
    ],
    // vi
    &[
        ("IV", 3.0),
        ("ii", 3.0),
        ("V", 2.0),
        ("ii6", 2.0),
        ("IV6", 1.0),
        ("I6", 1.0),
    ],
    // IV
    &[
        ("V", 4.0),
        ("ii", 2.0),
        ("I", 2.0),
        ("I64", 2.0),
        ("viio6", 1.0),
        ("ii6", 1.0),
    ],
    // ii
    &[
        ("V", 4.0),
        ("viio6", 2.0),
        ("I64", 2.0),
        ("V6", 1.0),
        ("iii", 1.0),
    ],
    // V
    &[
        ("I", 5.0),
        ("vi", 2.0),
        ("I6", 2.0),
        ("iii6", 1.0),
        ("IV6", 1.0),
    ],
    // iii
    &[("vi", 3.0), ("IV", 2.0), ("IV6", 2.0), ("vi6", 1.0)],
    // I6
    &[
        ("IV", 3.0),
        ("ii", 2.0),
        ("ii6", 2.0),
        ("V", 1.0),
        ("IV6", 1.0),
    ],
    // IV6
    &[
        ("V", 3.0),
        ("I64", 2.0),
        ("ii6", 1.0),
        ("viio6", 1.0),
        ("V6", 1.0),
    ],
    // ii6
    &[("V", 4.0), ("I64", 2.0), ("viio6", 1.0)],
    // V6
    &[("I", 4.0), ("vi", 1.0), ("iii6", 1.0)],
    // iii6
    &[("IV", 2.0), ("vi", 2.0), ("ii", 1.0), ("IV6", 1.0)],
    // vi6
    &[("ii", 2.0), ("IV", 2.0), ("V6", 1.0), ("ii6", 1.0)],
    // viio6
    &[("I", 4.0), ("I6", 2.0), ("iii", 1.0)],
    // I64
    &[("V", 4.0), ("V6", 1.0), ("viio6", 1.0)],
];

fn state_index(label: &str) -> usize {
    STATES
        .iter()
        .position(|s| *s == label)
        .expect("transition table references a known state")
}

fn state_chord(label: &str) -> ChordInScale {
    // State labels are diatonic, so the reference key never matters.
    let key = Key::new(PitchClass::new(0), Scale::major());
    roman::parse(label, &key)
        .expect("state labels are valid roman numerals")
        .0
}

/// Infinite, seed-deterministic chord stream following [`TRANSITIONS`].
pub struct MarkovChords {
    rng: ChaCha8Rng,
    state: Option<usize>,
}

impl MarkovChords {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            state: None,
        }
    }

    /// Advance the chain `n` times and return the last chord drawn.
    /// `n <= 0` is a no-op.
    pub fn advance(&mut self, n: i32) -> Option<ChordInScale> {
        if n <= 0 {
            return None;
        }
        let mut last = None;
        for _ in 0..n {
            last = self.next();
        }
        last
    }

    /// Label of the current state, once the chain has started.
    pub fn current_label(&self) -> Option<&'static str> {
        self.state.map(|i| STATES[i])
    }

    fn race_draw(&mut self, edges: &[(&str, f64)]) -> usize {
        let mut best = 0;
        let mut best_time = f64::INFINITY;
        for (i, (_, weight)) in edges.iter().enumerate() {
            // U in (0, 1]: avoid ln(0)
            let u: f64 = 1.0 - self.rng.gen::<f64>();
            let time = -u.ln() / weight;
            if time < best_time {
                best_time = time;
                best = i;
            }
        }
        best
    }
}

impl Iterator for MarkovChords {
    type Item = ChordInScale;

    fn next(&mut self) -> Option<ChordInScale> {
        let next_state = match self.state {
            // First draw is always the tonic.
            None => state_index("I"),
            Some(current) => {
                let edges = TRANSITIONS[current];
                let winner = self.race_draw(edges);
                state_index(edges[winner].0)
            }
        };
        self.state = Some(next_state);
        Some(state_chord(STATES[next_state]))
    }
}
