//! Score compiler: absolute-beat note lists against a harmony timeline.
//!
//! Each note queries the timeline at its own onset beat and resolves against
//! that snapshot, so a chord change between two notes of the same track is
//! heard exactly at the change. Holds extend the previous sounding event
//! instead of re-striking it; notes that fail to resolve become silent slots
//! of the same duration, keeping the rest of the track on grid.

use tracing::warn;

use crate::error::CompileError;
use crate::harmony::{parse_note_name, HarmonyTimeline, Key, Level, MelodyNote};
use crate::pattern::{
    perturbation, CompiledPattern, LabelClock, ScoreDoc, ScoreNoteKind, ScoreTrackDoc, StepSource,
    Track, TrackStep,
};
use crate::sink::NoteEvent;

pub fn compile_score(doc: &ScoreDoc) -> Result<CompiledPattern, CompileError> {
    let key = Key::parse(&doc.key).ok_or_else(|| CompileError::UnknownKey(doc.key.clone()))?;
    let timeline = HarmonyTimeline::new(doc.total_beats, key, doc.events.clone());

    let tracks = doc
        .tracks
        .iter()
        .map(|track| compile_track(track, doc, &timeline))
        .collect();

    Ok(CompiledPattern {
        name: doc.name.clone().unwrap_or_else(|| "score".to_string()),
        tracks,
        hierarchy: None,
        hierarchy_modulators: Vec::new(),
        emitters: Default::default(),
        label_clock: Some(LabelClock {
            timeline: timeline.clone(),
            seconds_per_beat: doc.seconds_per_beat,
            looped: doc.looped,
        }),
    })
}

fn compile_track(track: &ScoreTrackDoc, doc: &ScoreDoc, timeline: &HarmonyTimeline) -> Track {
    let spb = doc.seconds_per_beat;
    let mut steps: Vec<TrackStep> = Vec::with_capacity(track.notes.len());
    let mut beat = 0.0;

    for note in &track.notes {
        let duration = note.duration.max(0.0);
        match &note.kind {
            ScoreNoteKind::Hold => {
                // Extend the previous sounding event; a hold with nothing to
                // extend is silence.
                match steps.last_mut().filter(|s| !s.notes.is_empty()) {
                    Some(prev) => {
                        prev.gap_secs += duration * spb;
                        prev.sustain_secs = prev.gap_secs * doc.sustain_fraction;
                    }
                    None => steps.push(silent(duration * spb)),
                }
            }
            ScoreNoteKind::Rest => steps.push(silent(duration * spb)),
            kind => {
                let state = timeline.state_at(beat, doc.looped);
                let pitches = resolve_kind(kind, &state, track.octave);
                if pitches.is_empty() {
                    warn!(track = %track.name, beat, "note did not resolve, inserting silence");
                    steps.push(silent(duration * spb));
                } else {
                    steps.push(TrackStep {
                        notes: pitches
                            .into_iter()
                            .map(|p| NoteEvent::new(p, track.velocity))
                            .collect(),
                        sustain_secs: duration * spb * doc.sustain_fraction,
                        gap_secs: duration * spb,
                        label: Some(state.chord_label()),
                    });
                }
            }
        }
        beat += duration;
    }

    Track {
        name: track.name.clone(),
        source: StepSource::Steps {
            steps,
            looped: doc.looped,
            pos: 0,
        },
        modulators: Vec::new(),
        shadows: Vec::new(),
    }
}

fn silent(gap_secs: f64) -> TrackStep {
    TrackStep {
        notes: Vec::new(),
        sustain_secs: 0.0,
        gap_secs,
        label: None,
    }
}

fn resolve_kind(
    kind: &ScoreNoteKind,
    state: &crate::harmony::PitchHierarchy,
    octave: i32,
) -> Vec<u8> {
    match kind {
        ScoreNoteKind::CurrentChord => (0..state.chord.len() as i32)
            .filter_map(|i| state.resolve(MelodyNote::tone(i), Level::Chord, octave))
            .collect(),
        ScoreNoteKind::ChordTone {
            index,
            chroma,
            shift,
        } => {
            let note = MelodyNote {
                chord_tone: *index,
                perturbation: perturbation(*chroma, *shift),
            };
            state.resolve(note, Level::Chord, octave).into_iter().collect()
        }
        ScoreNoteKind::ScaleDegree { degree, chroma } => {
            let note = MelodyNote {
                chord_tone: *degree,
                perturbation: perturbation(*chroma, 0),
            };
            state.resolve(note, Level::Scale, octave).into_iter().collect()
        }
        ScoreNoteKind::Absolute { pitch } => parse_note_name(pitch).into_iter().collect(),
        // Rest and hold never reach resolution.
        ScoreNoteKind::Rest | ScoreNoteKind::Hold => Vec::new(),
    }
}
