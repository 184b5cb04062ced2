//! Absolute-beat harmony index for score-style patterns.
//!
//! Built once from a sorted chord/key event list; queried by beat position.
//! Every query folds the events from the start, so cost is O(events) — fine
//! for the intended scale (well under 100 events per pattern) and it keeps
//! queries independent: nothing is cached between notes.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::chord::ChordInScale;
use super::hierarchy::{Level, PitchHierarchy};
use super::roman;
use super::scale::Key;

/// A chord or key operation at a point in musical time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HarmonyOp {
    /// Replace the chord outright.
    SetChord {
        degrees: Vec<i32>,
        #[serde(default)]
        inversion: i32,
    },
    /// `T(n)` at chord level.
    Transpose { n: i32 },
    /// `t(n)` at chord level.
    Rotate { n: i32 },
    /// `T(t)` then `t(r)`, both at chord level.
    TransposeRotate { t: i32, r: i32 },
    /// Replace the key (`"Eb major"` syntax).
    SetKey { key: String },
    /// Parse a roman-numeral symbol; unsupported symbols leave the harmony
    /// unchanged, and an applied chord's key persists from here on.
    SetRoman { symbol: String },
}

/// One timeline entry: a beat position plus its operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonyEvent {
    pub beat: f64,
    #[serde(flatten)]
    pub op: HarmonyOp,
}

/// Immutable absolute-beat harmony index.
#[derive(Debug, Clone)]
pub struct HarmonyTimeline {
    total_beats: f64,
    initial_key: Key,
    events: Vec<HarmonyEvent>,
}

impl HarmonyTimeline {
    /// Build the index. Events are sorted by beat (stable, so simultaneous
    /// events keep their authored order).
    pub fn new(total_beats: f64, initial_key: Key, mut events: Vec<HarmonyEvent>) -> Self {
        events.sort_by(|a, b| a.beat.partial_cmp(&b.beat).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            total_beats,
            initial_key,
            events,
        }
    }

    pub fn total_beats(&self) -> f64 {
        self.total_beats
    }

    /// Harmonic state at `beat`: fold every event with `event.beat <= beat`
    /// in order, starting from (initial key, tonic triad). With `looped`,
    /// `beat` first reduces modulo `total_beats` (guarding non-positive
    /// totals).
    pub fn state_at(&self, beat: f64, looped: bool) -> PitchHierarchy {
        let effective = if looped && self.total_beats > 0.0 {
            beat.rem_euclid(self.total_beats)
        } else {
            beat
        };

        let mut state = PitchHierarchy::new(self.initial_key.clone(), ChordInScale::tonic_triad());
        for event in self.events.iter().filter(|e| e.beat <= effective) {
            apply_op(&mut state, &event.op);
        }
        state
    }
}

fn apply_op(state: &mut PitchHierarchy, op: &HarmonyOp) {
    match op {
        HarmonyOp::SetChord { degrees, inversion } => {
            if degrees.is_empty() {
                warn!("ignoring set_chord with empty degree list");
                return;
            }
            state.chord = ChordInScale::new(degrees.clone(), *inversion);
        }
        HarmonyOp::Transpose { n } => state.transpose(*n, Level::Chord),
        HarmonyOp::Rotate { n } => state.rotate(*n, Level::Chord),
        HarmonyOp::TransposeRotate { t, r } => {
            state.transpose(*t, Level::Chord);
            state.rotate(*r, Level::Chord);
        }
        HarmonyOp::SetKey { key } => match Key::parse(key) {
            Some(parsed) => state.key = parsed,
            None => warn!(key, "unparseable key name, key unchanged"),
        },
        HarmonyOp::SetRoman { symbol } => {
            if let Some((chord, new_key)) = roman::parse_or_warn(symbol, &state.key) {
                state.chord = chord;
                if let Some(key) = new_key {
                    state.key = key;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony::pitch::PitchClass;
    use crate::harmony::scale::Scale;

    fn c_major() -> Key {
        Key::new(PitchClass::new(0), Scale::major())
    }

    fn roman_event(beat: f64, symbol: &str) -> HarmonyEvent {
        HarmonyEvent {
            beat,
            op: HarmonyOp::SetRoman {
                symbol: symbol.to_string(),
            },
        }
    }

    #[test]
    fn empty_timeline_is_tonic() {
        let tl = HarmonyTimeline::new(8.0, c_major(), vec![]);
        let state = tl.state_at(3.0, false);
        assert_eq!(state.chord, ChordInScale::tonic_triad());
        assert_eq!(state.key, c_major());
    }

    #[test]
    fn events_apply_up_to_and_including_beat() {
        let tl = HarmonyTimeline::new(
            8.0,
            c_major(),
            vec![roman_event(0.0, "I"), roman_event(4.0, "V")],
        );
        assert_eq!(tl.state_at(3.9, false).chord.degrees, vec![0, 2, 4]);
        assert_eq!(tl.state_at(4.0, false).chord.degrees, vec![4, 6, 8]);
    }

    #[test]
    fn events_sorted_on_build() {
        let tl = HarmonyTimeline::new(
            8.0,
            c_major(),
            vec![roman_event(4.0, "V"), roman_event(0.0, "IV")],
        );
        assert_eq!(tl.state_at(1.0, false).chord.degrees, vec![3, 5, 7]);
    }

    #[test]
    fn loop_reduces_modulo_total() {
        let tl = HarmonyTimeline::new(
            8.0,
            c_major(),
            vec![roman_event(0.0, "I"), roman_event(4.0, "V")],
        );
        for k in 0..4u32 {
            let offset = 8.0 * k as f64;
            assert_eq!(
                tl.state_at(1.0 + offset, true),
                tl.state_at(1.0, true),
                "k = {k}"
            );
            assert_eq!(
                tl.state_at(5.0 + offset, true),
                tl.state_at(5.0, true),
                "k = {k}"
            );
        }
    }

    #[test]
    fn nonpositive_total_disables_loop_reduction() {
        let tl = HarmonyTimeline::new(0.0, c_major(), vec![roman_event(4.0, "V")]);
        assert_eq!(tl.state_at(5.0, true).chord.degrees, vec![4, 6, 8]);
    }

    #[test]
    fn transform_ops_compose() {
        let tl = HarmonyTimeline::new(
            8.0,
            c_major(),
            vec![
                HarmonyEvent {
                    beat: 0.0,
                    op: HarmonyOp::Transpose { n: 1 },
                },
                HarmonyEvent {
                    beat: 2.0,
                    op: HarmonyOp::TransposeRotate { t: 3, r: 1 },
                },
            ],
        );
        let state = tl.state_at(2.0, false);
        assert_eq!(state.chord.degrees, vec![4, 6, 8]);
        assert_eq!(state.chord.inversion, 1);
    }

    #[test]
    fn set_key_changes_resolution_frame() {
        let tl = HarmonyTimeline::new(
            8.0,
            c_major(),
            vec![HarmonyEvent {
                beat: 4.0,
                op: HarmonyOp::SetKey {
                    key: "G major".to_string(),
                },
            }],
        );
        assert_eq!(tl.state_at(4.0, false).key.root.name(), "G");
    }

    #[test]
    fn applied_chord_key_persists() {
        let tl = HarmonyTimeline::new(
            8.0,
            c_major(),
            vec![roman_event(0.0, "V/V"), roman_event(4.0, "I")],
        );
        // After the applied chord the key is G major, so the later I is G.
        let state = tl.state_at(4.0, false);
        assert_eq!(state.key.root.name(), "G");
        assert_eq!(state.chord.degrees, vec![0, 2, 4]);
    }

    #[test]
    fn unparseable_symbol_keeps_prior_harmony() {
        let tl = HarmonyTimeline::new(
            8.0,
            c_major(),
            vec![roman_event(0.0, "IV"), roman_event(2.0, "Qmaj7")],
        );
        assert_eq!(tl.state_at(3.0, false).chord.degrees, vec![3, 5, 7]);
    }

    #[test]
    fn empty_set_chord_ignored() {
        let tl = HarmonyTimeline::new(
            8.0,
            c_major(),
            vec![HarmonyEvent {
                beat: 0.0,
                op: HarmonyOp::SetChord {
                    degrees: vec![],
                    inversion: 0,
                },
            }],
        );
        assert_eq!(tl.state_at(1.0, false).chord, ChordInScale::tonic_triad());
    }

    #[test]
    fn harmony_event_json_round_trip() {
        let json = r#"{"beat": 4.0, "op": "set_roman", "symbol": "V7/V"}"#;
        let event: HarmonyEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, roman_event(4.0, "V7/V"));
    }
}
