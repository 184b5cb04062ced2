//! Raw note-event patterns: pre-decoded MIDI material as parallel arrays.
//!
//! Timing arrives already in seconds, so compilation is just zipping the
//! arrays into steps. Malformed pitch names degrade to silent slots rather
//! than failing the document; mismatched array lengths truncate to the
//! shortest.

use tracing::warn;

use crate::error::CompileError;
use crate::harmony::parse_note_name;
use crate::pattern::{
    CompiledPattern, MidiDoc, MidiPitchDoc, MidiTrackDoc, StepSource, Track, TrackStep,
};
use crate::sink::NoteEvent;

pub fn compile_midi(doc: &MidiDoc) -> Result<CompiledPattern, CompileError> {
    let tracks = doc.tracks.iter().map(compile_track).collect();
    Ok(CompiledPattern {
        name: doc.name.clone().unwrap_or_else(|| "midi".to_string()),
        tracks,
        hierarchy: None,
        hierarchy_modulators: Vec::new(),
        emitters: Default::default(),
        label_clock: None,
    })
}

fn compile_track(spec: &MidiTrackDoc) -> Track {
    let len = spec
        .notes
        .len()
        .min(spec.sustains.len())
        .min(spec.gaps.len());
    if len < spec.notes.len() || len < spec.sustains.len() || len < spec.gaps.len() {
        warn!(
            track = %spec.name,
            notes = spec.notes.len(),
            sustains = spec.sustains.len(),
            gaps = spec.gaps.len(),
            "array lengths differ, truncating to shortest"
        );
    }

    let steps = (0..len)
        .map(|i| TrackStep {
            notes: spec.notes[i]
                .iter()
                .filter_map(|n| {
                    let pitch = match &n.pitch {
                        MidiPitchDoc::Number(p) if *p <= 127 => Some(*p),
                        MidiPitchDoc::Number(p) => {
                            warn!(track = %spec.name, pitch = *p, "pitch out of range, dropping");
                            None
                        }
                        MidiPitchDoc::Name(name) => {
                            let parsed = parse_note_name(name);
                            if parsed.is_none() {
                                warn!(track = %spec.name, name = %name, "unparseable pitch name, dropping");
                            }
                            parsed
                        }
                    }?;
                    Some(NoteEvent::new(pitch, n.velocity))
                })
                .collect(),
            sustain_secs: spec.sustains[i].max(0.0),
            gap_secs: spec.gaps[i].max(0.0),
            label: None,
        })
        .collect();

    Track {
        name: spec.name.clone(),
        source: StepSource::Steps {
            steps,
            looped: spec.looped,
            pos: 0,
        },
        modulators: Vec::new(),
        shadows: Vec::new(),
    }
}
