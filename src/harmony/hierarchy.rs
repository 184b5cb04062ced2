//! The shared mutable harmonic state and its transformation operators.
//!
//! A [`PitchHierarchy`] owns one [`Key`] and one [`ChordInScale`] for the
//! lifetime of a compiled pattern. Hierarchy-modulator tasks mutate it in
//! place through the `T`/`t`/`L` operators; note resolution reads it through
//! a snapshot clone, never concurrently with mutation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::chord::ChordInScale;
use super::pitch::{midi_pitch, PitchClass};
use super::scale::{Key, Scale};

/// Which layer of the hierarchy an operator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Scale,
    Chord,
}

/// Optional adjustment applied to a melody note during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perturbation {
    #[default]
    None,
    /// Semitone offset applied to the final resolved pitch.
    Chromatic(i32),
    /// Scale-degree offset applied before resolution.
    Degree(i32),
}

/// A transient chord-tone query: which voiced tone, with what adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MelodyNote {
    pub chord_tone: i32,
    #[serde(default)]
    pub perturbation: Perturbation,
}

impl MelodyNote {
    pub fn tone(chord_tone: i32) -> Self {
        Self {
            chord_tone,
            perturbation: Perturbation::None,
        }
    }
}

/// Minimal-voice-leading lattice steps, keyed by (chord size, scale size).
///
/// Each entry solves `big_t * chord_size + little_t * scale_size ≡ ±1`;
/// other size pairs are deliberately unhandled (no general formula is
/// assumed) and `L` degrades to a no-op for them.
const LATTICE_STEPS: [((usize, usize), (i32, i32)); 2] =
    [((3, 7), (-2, 1)), ((4, 7), (5, -3))];

/// The shared harmonic state: one key, one chord.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchHierarchy {
    pub key: Key,
    pub chord: ChordInScale,
}

impl PitchHierarchy {
    pub fn new(key: Key, chord: ChordInScale) -> Self {
        Self { key, chord }
    }

    /// C major, tonic triad.
    pub fn default_major() -> Self {
        Self::new(
            Key::new(PitchClass::new(0), Scale::major()),
            ChordInScale::tonic_triad(),
        )
    }

    /// `T`: diatonic transposition.
    ///
    /// At chord level, adds `n` to every chord degree. At scale level, shifts
    /// the key root by `n` semitones (spelling via the flat-preference
    /// table), leaving the scale unchanged.
    pub fn transpose(&mut self, n: i32, level: Level) {
        match level {
            Level::Chord => self.chord.transpose(n),
            Level::Scale => self.key.root = self.key.root.shifted(n),
        }
    }

    /// `t`: rotation.
    ///
    /// At chord level, rotates the voicing. At scale level, rotates the mode:
    /// the scale's step list is cyclically permuted by `n`, the root advances
    /// by the semitones of the steps removed from the front, and the
    /// resulting interval set is matched against the named-scale table. The
    /// underlying pitch content is unchanged (C major `t(1)` → D dorian).
    pub fn rotate(&mut self, n: i32, level: Level) {
        match level {
            Level::Chord => self.chord.rotate(n),
            Level::Scale => self.rotate_mode(n),
        }
    }

    fn rotate_mode(&mut self, n: i32) {
        let steps = self.key.scale.steps();
        let len = steps.len();
        let shift = n.rem_euclid(len as i32) as usize;
        if shift == 0 {
            return;
        }

        let removed: i32 = steps[..shift].iter().map(|&s| s as i32).sum();
        let mut rotated = Vec::with_capacity(len);
        rotated.extend_from_slice(&steps[shift..]);
        rotated.extend_from_slice(&steps[..shift]);

        let mut intervals = Vec::with_capacity(len);
        let mut acc = 0u8;
        for &step in rotated.iter().take(len) {
            intervals.push(acc);
            acc += step;
        }

        // len >= 1 is a structural invariant, so this cannot be None
        if let Some(scale) = Scale::from_intervals(intervals) {
            self.key.scale = scale;
        }
        self.key.root = self.key.root.shifted(removed);
    }

    /// `L`: apply the minimal-voice-leading lattice step `n` times.
    ///
    /// Each step is `T(big_t)` at chord level then `t(little_t)` at chord
    /// level, with `(big_t, little_t)` from [`LATTICE_STEPS`]. Negative `n`
    /// applies the inverse step. Unsupported size pairs are a no-op.
    pub fn lattice(&mut self, n: i32) {
        let sizes = (self.chord.len(), self.key.scale.len());
        let Some(&(_, (big_t, little_t))) =
            LATTICE_STEPS.iter().find(|(pair, _)| *pair == sizes)
        else {
            debug!(
                chord_size = sizes.0,
                scale_size = sizes.1,
                "no lattice step for this size pair, L is a no-op"
            );
            return;
        };
        let (big_t, little_t) = if n < 0 {
            (-big_t, -little_t)
        } else {
            (big_t, little_t)
        };
        for _ in 0..n.abs() {
            self.chord.transpose(big_t);
            self.chord.rotate(little_t);
        }
    }

    /// Resolve a melody note to a MIDI pitch.
    ///
    /// Chord level indexes into the voiced degrees (out of bounds → `None`);
    /// scale level uses the chord-tone index directly as a scale degree.
    /// Degree perturbations shift diatonically before resolution; chromatic
    /// perturbations (and the chord's own chromatic offsets) shift the final
    /// semitone value. Returns `None` outside the 0–127 MIDI range.
    pub fn resolve(&self, note: MelodyNote, level: Level, octave: i32) -> Option<u8> {
        let (mut degree, chroma) = match level {
            Level::Chord => {
                let voiced = self.chord.voiced_degrees();
                let idx = usize::try_from(note.chord_tone).ok()?;
                if idx >= voiced.len() {
                    return None;
                }
                (voiced[idx], self.chord.voiced_offsets()[idx])
            }
            Level::Scale => (note.chord_tone, 0),
        };

        let mut chromatic = chroma;
        match note.perturbation {
            Perturbation::None => {}
            Perturbation::Degree(d) => degree += d,
            Perturbation::Chromatic(c) => chromatic += c,
        }

        let semitones =
            self.key.root.semitones() as i32 + self.key.scale.degree_semitones(degree) + chromatic;
        midi_pitch(semitones, octave)
    }

    /// Pitch classes of the chord at concrete pitches, inversion-independent,
    /// in degree order starting from the chord root.
    pub fn chord_pitch_classes(&self) -> Vec<PitchClass> {
        let offsets = match &self.chord.offsets {
            Some(o) => o.clone(),
            None => vec![0; self.chord.len()],
        };
        self.chord
            .degrees
            .iter()
            .zip(offsets)
            .map(|(&d, o)| {
                self.key
                    .root
                    .shifted(self.key.scale.degree_semitones(d) + o)
            })
            .collect()
    }

    /// Best-guess chord label for UI purposes, e.g. `"G7"` or `"Eb"`.
    pub fn chord_label(&self) -> String {
        let pcs = self.chord_pitch_classes();
        let root = pcs[0];
        let quality = recognize_quality(&pcs);
        format!("{}{}", root.name(), quality)
    }

    /// Best-guess roman-numeral name, e.g. `"ii6"` or `"V7"`.
    pub fn roman_numeral_name(&self) -> String {
        let pcs = self.chord_pitch_classes();
        let quality = recognize_quality(&pcs);
        let minorish = matches!(quality, "m" | "m7" | "o" | "o7" | "ø7");
        let degree = self.chord.degrees[0].rem_euclid(self.key.scale.len() as i32) as usize;
        let numeral = ROMAN_NUMERALS[degree.min(ROMAN_NUMERALS.len() - 1)];
        let numeral = if minorish {
            numeral.to_lowercase()
        } else {
            numeral.to_string()
        };
        let marker = match quality {
            "o" | "o7" => "o",
            "ø7" => "ø",
            _ => "",
        };
        format!("{}{}{}", numeral, marker, figure(&self.chord))
    }
}

const ROMAN_NUMERALS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

/// Interval-pattern chord recognition against a fixed quality table.
fn recognize_quality(pcs: &[PitchClass]) -> &'static str {
    let root = pcs[0].semitones() as i32;
    let mut intervals: Vec<i32> = pcs
        .iter()
        .map(|pc| (pc.semitones() as i32 - root).rem_euclid(12))
        .collect();
    intervals.sort_unstable();
    intervals.dedup();

    match intervals.as_slice() {
        [0, 4, 7] => "",
        [0, 3, 7] => "m",
        [0, 3, 6] => "o",
        [0, 4, 8] => "+",
        [0, 4, 7, 11] => "maj7",
        [0, 4, 7, 10] => "7",
        [0, 3, 7, 10] => "m7",
        [0, 3, 6, 10] => "ø7",
        [0, 3, 6, 9] => "o7",
        [0, 2, 4, 7, 10] => "9",
        _ => "?",
    }
}

/// Figured-bass suffix from chord size and inversion.
fn figure(chord: &ChordInScale) -> &'static str {
    let inv = chord.inversion.rem_euclid(chord.len() as i32);
    match (chord.len(), inv) {
        (3, 1) => "6",
        (3, 2) => "6/4",
        (4, 0) => "7",
        (4, 1) => "6/5",
        (4, 2) => "4/3",
        (4, 3) => "2",
        (5, 0) => "9",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c_major() -> PitchHierarchy {
        PitchHierarchy::default_major()
    }

    #[test]
    fn transpose_chord_level() {
        let mut h = c_major();
        h.transpose(1, Level::Chord);
        assert_eq!(h.chord.degrees, vec![1, 3, 5]);
        assert_eq!(h.key.root.semitones(), 0); // key untouched
    }

    #[test]
    fn transpose_scale_level_moves_root() {
        let mut h = c_major();
        h.transpose(3, Level::Scale);
        assert_eq!(h.key.root.name(), "Eb");
        assert_eq!(h.key.scale.name(), Some("major")); // scale unchanged
        assert_eq!(h.chord.degrees, vec![0, 2, 4]);
    }

    #[test]
    fn rotate_chord_level_changes_inversion() {
        let mut h = c_major();
        h.rotate(2, Level::Chord);
        assert_eq!(h.chord.voiced_degrees(), vec![4, 0, 2]);
    }

    #[test]
    fn mode_rotation_c_ionian_to_d_dorian() {
        let mut h = c_major();
        h.rotate(1, Level::Scale);
        assert_eq!(h.key.root.name(), "D");
        assert_eq!(h.key.scale.name(), Some("dorian"));
    }

    #[test]
    fn mode_rotation_preserves_pitch_content() {
        let mut h = c_major();
        let before: Vec<u8> = (0..7)
            .map(|d| h.resolve(MelodyNote::tone(d), Level::Scale, 4).unwrap())
            .collect();
        h.rotate(1, Level::Scale);
        let after: Vec<u8> = (-1..6)
            .map(|d| h.resolve(MelodyNote::tone(d), Level::Scale, 4).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn mode_rotation_full_cycle_is_identity() {
        let mut h = c_major();
        h.rotate(7, Level::Scale);
        assert_eq!(h.key.root.name(), "C");
        assert_eq!(h.key.scale.name(), Some("major"));
    }

    #[test]
    fn mode_rotation_falls_back_to_unnamed() {
        let mut h = c_major();
        h.key.scale = Scale::from_intervals(vec![0, 1, 4, 5, 7, 8, 11]).unwrap();
        h.rotate(1, Level::Scale);
        assert_eq!(h.key.scale.name(), None);
        assert_eq!(h.key.root.name(), "Db");
    }

    #[test]
    fn lattice_triad_in_major() {
        let mut h = c_major();
        h.lattice(1);
        // (3, 7) → T(-2) then t(1)
        assert_eq!(h.chord.degrees, vec![-2, 0, 2]);
        assert_eq!(h.chord.inversion, 1);
    }

    #[test]
    fn lattice_inverse_round_trip() {
        let mut h = c_major();
        h.lattice(2);
        h.lattice(-2);
        assert_eq!(h.chord.degrees, vec![0, 2, 4]);
        assert_eq!(h.chord.inversion, 0);
    }

    #[test]
    fn lattice_unsupported_sizes_is_noop() {
        let mut h = c_major();
        h.chord = ChordInScale::new(vec![0, 2, 4, 6, 8], 0);
        let before = h.clone();
        h.lattice(3);
        assert_eq!(h, before);
    }

    #[test]
    fn resolve_tonic_chord_tones() {
        let h = c_major();
        assert_eq!(h.resolve(MelodyNote::tone(0), Level::Chord, 4), Some(60));
        assert_eq!(h.resolve(MelodyNote::tone(1), Level::Chord, 4), Some(64));
        assert_eq!(h.resolve(MelodyNote::tone(2), Level::Chord, 4), Some(67));
    }

    #[test]
    fn resolve_respects_inversion() {
        let mut h = c_major();
        h.rotate(1, Level::Chord);
        // First voiced tone is now the third of the chord.
        assert_eq!(h.resolve(MelodyNote::tone(0), Level::Chord, 4), Some(64));
    }

    #[test]
    fn resolve_scale_level_ignores_chord() {
        let mut h = c_major();
        h.transpose(4, Level::Chord);
        assert_eq!(h.resolve(MelodyNote::tone(1), Level::Scale, 4), Some(62));
    }

    #[test]
    fn resolve_out_of_bounds_tone_is_none() {
        let h = c_major();
        assert_eq!(h.resolve(MelodyNote::tone(3), Level::Chord, 4), None);
        assert_eq!(h.resolve(MelodyNote::tone(-1), Level::Chord, 4), None);
    }

    #[test]
    fn resolve_degree_perturbation_shifts_diatonically() {
        let h = c_major();
        let note = MelodyNote {
            chord_tone: 0,
            perturbation: Perturbation::Degree(1),
        };
        assert_eq!(h.resolve(note, Level::Chord, 4), Some(62)); // C → D
    }

    #[test]
    fn resolve_chromatic_perturbation_shifts_semitones() {
        let h = c_major();
        let note = MelodyNote {
            chord_tone: 0,
            perturbation: Perturbation::Chromatic(-1),
        };
        assert_eq!(h.resolve(note, Level::Chord, 4), Some(59));
    }

    #[test]
    fn resolve_octave_wrap_negative_degree() {
        let h = c_major();
        // Scale degree -1 is B3 when asked for octave 4.
        assert_eq!(h.resolve(MelodyNote::tone(-1), Level::Scale, 4), Some(59));
    }

    #[test]
    fn resolve_out_of_midi_range_is_none() {
        let h = c_major();
        assert_eq!(h.resolve(MelodyNote::tone(0), Level::Scale, 10), None);
        assert_eq!(h.resolve(MelodyNote::tone(-30), Level::Scale, 0), None);
    }

    #[test]
    fn chord_label_tonic() {
        assert_eq!(c_major().chord_label(), "C");
    }

    #[test]
    fn chord_label_minor_and_seventh() {
        let mut h = c_major();
        h.transpose(1, Level::Chord);
        assert_eq!(h.chord_label(), "Dm");

        let mut h = c_major();
        h.chord = ChordInScale::new(vec![4, 6, 8, 10], 0);
        assert_eq!(h.chord_label(), "G7");
    }

    #[test]
    fn chord_label_ignores_inversion() {
        let mut h = c_major();
        h.rotate(1, Level::Chord);
        assert_eq!(h.chord_label(), "C");
    }

    #[test]
    fn roman_name_with_figure() {
        let mut h = c_major();
        h.transpose(1, Level::Chord);
        h.rotate(1, Level::Chord);
        assert_eq!(h.roman_numeral_name(), "ii6");
    }

    #[test]
    fn roman_name_dominant_seventh() {
        let mut h = c_major();
        h.chord = ChordInScale::new(vec![4, 6, 8, 10], 0);
        assert_eq!(h.roman_numeral_name(), "V7");
    }
}
