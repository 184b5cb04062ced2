//! Table compiler: emitter rows, a shared hierarchy, and live track assembly.
//!
//! Unlike a score, a table track has no fixed length: each step is generated
//! on demand by pulling its sustain/gap/octave emitters and resolving its
//! material against a snapshot of the shared hierarchy, so concurrently
//! running hierarchy modulators are heard at the next step boundary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::emitter::{compile_emitters, Emitter};
use crate::error::CompileError;
use crate::harmony::{
    ChordInScale, Key, Level, MarkovChords, MelodyNote, PitchHierarchy,
};
use crate::harmony::roman;
use crate::pattern::{
    lock, perturbation, CompiledPattern, HierarchyModOp, HierarchyModulator, HierarchyOpDoc,
    IntervalDoc, IntervalSource, MaterialTone, ModTarget, Modulator, StepSource, TableDoc,
    TableTrackDoc, Track, TrackStep,
};
use crate::sink::NoteEvent;

/// Markov chains draw from a stream separated from the emitter streams so
/// adding emitter rows does not reshuffle the progression.
const MARKOV_SEED_OFFSET: u64 = 0x9e37;

pub fn compile_table(doc: &TableDoc, seed: u64) -> Result<CompiledPattern, CompileError> {
    let emitters = compile_emitters(&doc.emitters, seed)?;
    let hierarchy = Arc::new(Mutex::new(build_hierarchy(doc)?));

    let mut materials: HashMap<&str, Arc<Material>> = HashMap::new();
    for material in &doc.materials {
        if material.steps.is_empty() {
            return Err(CompileError::EmptyMaterial(material.name.clone()));
        }
        materials.insert(
            material.name.as_str(),
            Arc::new(Material {
                level: material.level,
                steps: material.steps.clone(),
            }),
        );
    }

    let mut modulators: HashMap<&str, Modulator> = HashMap::new();
    for spec in &doc.modulators {
        let emitter = Arc::clone(emitters.get(&spec.emitter)?);
        let target = match (&spec.control, &spec.target_emitter, &spec.param) {
            (Some(control), None, None) => ModTarget::Control(control.clone()),
            (None, Some(target_name), Some(param)) => {
                let target = Arc::clone(emitters.get(target_name)?);
                if !target.param_names().contains(param) {
                    return Err(CompileError::UnknownParam {
                        emitter: target_name.clone(),
                        param: param.clone(),
                    });
                }
                ModTarget::EmitterParam {
                    emitter: target,
                    param: param.clone(),
                }
            }
            _ => return Err(CompileError::InvalidModulator(spec.name.clone())),
        };
        modulators.insert(
            spec.name.as_str(),
            Modulator {
                name: spec.name.clone(),
                emitter,
                target,
            },
        );
    }

    let mut hierarchy_modulators = Vec::with_capacity(doc.hierarchy_modulators.len());
    for (index, spec) in doc.hierarchy_modulators.iter().enumerate() {
        let interval = match &spec.every {
            IntervalDoc::Seconds(secs) => IntervalSource::Seconds(*secs),
            IntervalDoc::Emitter(name) => IntervalSource::Emitter(emitters.require_float(name)?),
        };
        let op = match &spec.op {
            HierarchyOpDoc::Transpose { n, level } => HierarchyModOp::Transpose {
                n: *n,
                level: *level,
            },
            HierarchyOpDoc::Rotate { n, level } => HierarchyModOp::Rotate {
                n: *n,
                level: *level,
            },
            HierarchyOpDoc::Lattice { n } => HierarchyModOp::Lattice { n: *n },
            HierarchyOpDoc::Markov { advance } => HierarchyModOp::Markov {
                advance: *advance,
                chain: MarkovChords::new(
                    seed.wrapping_add(MARKOV_SEED_OFFSET).wrapping_add(index as u64),
                ),
            },
        };
        hierarchy_modulators.push(HierarchyModulator { interval, op });
    }

    let tracks = doc
        .tracks
        .iter()
        .map(|track| compile_track(track, &materials, &modulators, &emitters, &hierarchy))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledPattern {
        name: doc.name.clone().unwrap_or_else(|| "table".to_string()),
        tracks,
        hierarchy: Some(hierarchy),
        hierarchy_modulators,
        emitters,
        label_clock: None,
    })
}

struct Material {
    level: Level,
    steps: Vec<Vec<MaterialTone>>,
}

fn build_hierarchy(doc: &TableDoc) -> Result<PitchHierarchy, CompileError> {
    let Some(spec) = &doc.hierarchy else {
        return Ok(PitchHierarchy::default_major());
    };
    let key = Key::parse(&spec.key).ok_or_else(|| CompileError::UnknownKey(spec.key.clone()))?;

    let chord = if let Some(degrees) = &spec.degrees {
        if degrees.is_empty() {
            return Err(CompileError::InvalidHierarchy(
                "initial chord has no degrees".to_string(),
            ));
        }
        ChordInScale::new(degrees.clone(), spec.inversion)
    } else if let Some(symbol) = &spec.roman {
        // Unsupported symbols degrade to the tonic triad, matching the
        // timeline's recoverable-parse behavior.
        match roman::parse_or_warn(symbol, &key) {
            Some((chord, _)) => chord,
            None => ChordInScale::tonic_triad(),
        }
    } else {
        ChordInScale::tonic_triad()
    };

    Ok(PitchHierarchy::new(key, chord))
}

fn compile_track(
    spec: &TableTrackDoc,
    materials: &HashMap<&str, Arc<Material>>,
    modulators: &HashMap<&str, Modulator>,
    emitters: &crate::emitter::EmitterSet,
    hierarchy: &Arc<Mutex<PitchHierarchy>>,
) -> Result<Track, CompileError> {
    let material = materials
        .get(spec.material.as_str())
        .cloned()
        .ok_or_else(|| CompileError::UnknownMaterial(spec.material.clone()))?;
    let sustain = emitters.require_float(&spec.sustain)?;
    let gap = emitters.require_float(&spec.gap)?;
    let octave = match &spec.octave {
        None => OctaveSource::Fixed(4),
        Some(crate::pattern::OctaveDoc::Fixed(o)) => OctaveSource::Fixed(*o),
        Some(crate::pattern::OctaveDoc::Emitter(name)) => {
            OctaveSource::Emitter(emitters.require_int(name)?)
        }
    };
    let velocity = match &spec.velocity {
        None => VelocitySource::Fixed(0.8),
        Some(crate::pattern::VelocityDoc::Fixed(v)) => VelocitySource::Fixed(*v),
        Some(crate::pattern::VelocityDoc::Emitter(name)) => {
            VelocitySource::Emitter(emitters.require_float(name)?)
        }
    };

    let track_modulators = spec
        .modulators
        .iter()
        .map(|name| {
            modulators
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| CompileError::UnknownModulator(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let shadows = spec
        .annotate
        .iter()
        .map(|name| emitters.get(name).map(|e| (name.clone(), Arc::clone(e))))
        .collect::<Result<Vec<_>, _>>()?;

    let shared = Arc::clone(hierarchy);
    let mut pos = 0usize;
    let generate = move || {
        let step = &material.steps[pos % material.steps.len()];
        pos = pos.wrapping_add(1);

        let snapshot = lock(&shared).clone();
        let octave = octave.read();
        let velocity = velocity.read();
        let notes: Vec<NoteEvent> = step
            .iter()
            .filter_map(|tone| {
                let note = melody_note(tone);
                snapshot
                    .resolve(note, material.level, octave)
                    .map(|pitch| NoteEvent::new(pitch, velocity))
            })
            .collect();

        Some(TrackStep {
            notes,
            sustain_secs: sustain.pull().max(0.0),
            gap_secs: gap.pull().max(0.0),
            label: Some(snapshot.chord_label()),
        })
    };

    Ok(Track {
        name: spec.name.clone(),
        source: StepSource::Live(Box::new(generate)),
        modulators: track_modulators,
        shadows,
    })
}

enum OctaveSource {
    Fixed(i32),
    Emitter(Arc<Emitter>),
}

impl OctaveSource {
    fn read(&self) -> i32 {
        match self {
            OctaveSource::Fixed(o) => *o,
            OctaveSource::Emitter(e) => e.pull() as i32,
        }
    }
}

enum VelocitySource {
    Fixed(f64),
    Emitter(Arc<Emitter>),
}

impl VelocitySource {
    fn read(&self) -> f64 {
        match self {
            VelocitySource::Fixed(v) => *v,
            VelocitySource::Emitter(e) => e.pull(),
        }
        .clamp(0.0, 1.0)
    }
}

fn melody_note(tone: &MaterialTone) -> MelodyNote {
    match tone {
        MaterialTone::Plain(t) => MelodyNote::tone(*t),
        MaterialTone::Detailed {
            tone,
            chroma,
            shift,
        } => MelodyNote {
            chord_tone: *tone,
            perturbation: perturbation(*chroma, *shift),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{EmitterFn, EmitterSpec, OutputKind, UpdatePolicy};
    use crate::pattern::{HierarchyDoc, HierarchyModDoc, MaterialDoc, ModulatorDoc, OctaveDoc};
    use crate::sink::{MemorySink, SinkCall};

    fn float_emitter(name: &str, func: EmitterFn) -> EmitterSpec {
        EmitterSpec {
            name: name.into(),
            output: OutputKind::Float,
            func,
            update: UpdatePolicy::Each,
        }
    }

    fn constant(name: &str, value: f64) -> EmitterSpec {
        float_emitter(name, EmitterFn::Constant { value })
    }

    fn base_doc() -> TableDoc {
        TableDoc {
            name: None,
            seed: None,
            emitters: vec![constant("sus", 0.2), constant("gap", 0.25)],
            hierarchy: None,
            hierarchy_modulators: vec![],
            materials: vec![MaterialDoc {
                name: "arp".into(),
                level: Level::Chord,
                steps: vec![
                    vec![MaterialTone::Plain(0)],
                    vec![MaterialTone::Plain(1)],
                    vec![MaterialTone::Plain(2)],
                    vec![],
                ],
            }],
            modulators: vec![],
            tracks: vec![TableTrackDoc {
                name: "lead".into(),
                material: "arp".into(),
                sustain: "sus".into(),
                gap: "gap".into(),
                octave: None,
                velocity: None,
                modulators: vec![],
                annotate: vec![],
            }],
        }
    }

    fn next_pitches(track: &mut Track) -> Vec<u8> {
        track
            .source
            .next()
            .expect("table tracks never end")
            .notes
            .iter()
            .map(|n| n.pitch)
            .collect()
    }

    #[test]
    fn material_steps_resolve_against_hierarchy() {
        let mut pattern = compile_table(&base_doc(), 0).unwrap();
        let track = &mut pattern.tracks[0];
        assert_eq!(next_pitches(track), vec![60]); // C
        assert_eq!(next_pitches(track), vec![64]); // E
        assert_eq!(next_pitches(track), vec![67]); // G
        assert_eq!(next_pitches(track), Vec::<u8>::new()); // rest step
        assert_eq!(next_pitches(track), vec![60]); // wrapped
    }

    #[test]
    fn step_timing_comes_from_emitters() {
        let mut pattern = compile_table(&base_doc(), 0).unwrap();
        let step = pattern.tracks[0].source.next().unwrap();
        assert_eq!(step.sustain_secs, 0.2);
        assert_eq!(step.gap_secs, 0.25);
        assert_eq!(step.label.as_deref(), Some("C"));
    }

    #[test]
    fn hierarchy_mutation_is_heard_at_next_step() {
        let mut pattern = compile_table(&base_doc(), 0).unwrap();
        let hierarchy = pattern.hierarchy.clone().unwrap();
        let track = &mut pattern.tracks[0];
        assert_eq!(next_pitches(track), vec![60]);
        lock(&hierarchy).transpose(1, Level::Chord);
        assert_eq!(next_pitches(track), vec![65]); // second degree of ii
    }

    #[test]
    fn initial_hierarchy_from_doc() {
        let mut doc = base_doc();
        doc.hierarchy = Some(HierarchyDoc {
            key: "G major".into(),
            roman: Some("V7".into()),
            degrees: None,
            inversion: 0,
        });
        let pattern = compile_table(&doc, 0).unwrap();
        let hierarchy = lock(pattern.hierarchy.as_ref().unwrap());
        assert_eq!(hierarchy.key.root.name(), "G");
        assert_eq!(hierarchy.chord.degrees, vec![4, 6, 8, 10]);
    }

    #[test]
    fn explicit_degrees_override_roman() {
        let mut doc = base_doc();
        doc.hierarchy = Some(HierarchyDoc {
            key: "C major".into(),
            roman: Some("V".into()),
            degrees: Some(vec![0, 3, 5]),
            inversion: 1,
        });
        let pattern = compile_table(&doc, 0).unwrap();
        let hierarchy = lock(pattern.hierarchy.as_ref().unwrap());
        assert_eq!(hierarchy.chord.degrees, vec![0, 3, 5]);
        assert_eq!(hierarchy.chord.inversion, 1);
    }

    #[test]
    fn empty_degrees_fail() {
        let mut doc = base_doc();
        doc.hierarchy = Some(HierarchyDoc {
            key: "C major".into(),
            roman: None,
            degrees: Some(vec![]),
            inversion: 0,
        });
        assert!(matches!(
            compile_table(&doc, 0),
            Err(CompileError::InvalidHierarchy(_))
        ));
    }

    #[test]
    fn unknown_material_fails() {
        let mut doc = base_doc();
        doc.tracks[0].material = "ghost".into();
        assert!(matches!(
            compile_table(&doc, 0),
            Err(CompileError::UnknownMaterial(_))
        ));
    }

    #[test]
    fn empty_material_fails() {
        let mut doc = base_doc();
        doc.materials[0].steps.clear();
        assert!(matches!(
            compile_table(&doc, 0),
            Err(CompileError::EmptyMaterial(_))
        ));
    }

    #[test]
    fn octave_emitter_must_be_integer() {
        let mut doc = base_doc();
        doc.tracks[0].octave = Some(OctaveDoc::Emitter("sus".into()));
        assert!(matches!(
            compile_table(&doc, 0),
            Err(CompileError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn octave_emitter_shifts_resolution() {
        let mut doc = base_doc();
        doc.emitters.push(EmitterSpec {
            name: "oct".into(),
            output: OutputKind::Octave,
            func: EmitterFn::Constant { value: 5.0 },
            update: UpdatePolicy::Each,
        });
        doc.tracks[0].octave = Some(OctaveDoc::Emitter("oct".into()));
        let mut pattern = compile_table(&doc, 0).unwrap();
        assert_eq!(next_pitches(&mut pattern.tracks[0]), vec![72]); // C5
    }

    #[test]
    fn velocity_emitter_drives_per_note_velocity() {
        let mut doc = base_doc();
        doc.emitters.push(constant("vel", 0.5));
        doc.tracks[0].velocity = Some(crate::pattern::VelocityDoc::Emitter("vel".into()));
        let mut pattern = compile_table(&doc, 0).unwrap();
        let step = pattern.tracks[0].source.next().unwrap();
        assert_eq!(step.notes[0].velocity, 0.5);
    }

    #[test]
    fn velocity_clamps_to_unit_range() {
        let mut doc = base_doc();
        doc.tracks[0].velocity = Some(crate::pattern::VelocityDoc::Fixed(3.0));
        let mut pattern = compile_table(&doc, 0).unwrap();
        let step = pattern.tracks[0].source.next().unwrap();
        assert_eq!(step.notes[0].velocity, 1.0);
    }

    #[test]
    fn control_modulator_writes_to_sink() {
        let mut doc = base_doc();
        doc.emitters.push(constant("lfo", 0.4));
        doc.modulators.push(ModulatorDoc {
            name: "cutoff".into(),
            emitter: "lfo".into(),
            control: Some("filter".into()),
            target_emitter: None,
            param: None,
        });
        doc.tracks[0].modulators = vec!["cutoff".into()];
        let pattern = compile_table(&doc, 0).unwrap();

        let sink = MemorySink::new();
        for modulator in &pattern.tracks[0].modulators {
            modulator.apply(&sink);
        }
        assert_eq!(
            sink.calls(),
            vec![SinkCall::Control("filter".into(), 0.4)]
        );
    }

    #[test]
    fn param_modulator_retargets_another_emitter() {
        let mut doc = base_doc();
        doc.emitters.push(constant("wide", 9.0));
        doc.emitters.push(float_emitter(
            "jitter",
            EmitterFn::Uniform { min: 0.0, max: 1.0 },
        ));
        doc.modulators.push(ModulatorDoc {
            name: "widen".into(),
            emitter: "wide".into(),
            control: None,
            target_emitter: Some("jitter".into()),
            param: Some("min".into()),
        });
        doc.tracks[0].modulators = vec!["widen".into()];
        let pattern = compile_table(&doc, 0).unwrap();

        let sink = MemorySink::new();
        pattern.tracks[0].modulators[0].apply(&sink);
        assert!(sink.calls().is_empty()); // wrote a param, not a control
        let jitter = pattern.emitters.get("jitter").unwrap();
        std::thread::sleep(crate::emitter::LATCH_WINDOW + std::time::Duration::from_millis(2));
        assert!(jitter.pull() >= 1.0); // min is now 9, max 1 → degenerate → min
    }

    #[test]
    fn modulator_with_no_target_fails() {
        let mut doc = base_doc();
        doc.emitters.push(constant("lfo", 0.4));
        doc.modulators.push(ModulatorDoc {
            name: "broken".into(),
            emitter: "lfo".into(),
            control: None,
            target_emitter: None,
            param: None,
        });
        assert!(matches!(
            compile_table(&doc, 0),
            Err(CompileError::InvalidModulator(_))
        ));
    }

    #[test]
    fn modulator_param_must_exist() {
        let mut doc = base_doc();
        doc.emitters.push(constant("lfo", 0.4));
        doc.modulators.push(ModulatorDoc {
            name: "bad".into(),
            emitter: "lfo".into(),
            control: None,
            target_emitter: Some("sus".into()),
            param: Some("mean".into()),
        });
        assert!(matches!(
            compile_table(&doc, 0),
            Err(CompileError::UnknownParam { .. })
        ));
    }

    #[test]
    fn markov_modulator_replaces_chord() {
        let mut doc = base_doc();
        doc.hierarchy_modulators.push(HierarchyModDoc {
            every: IntervalDoc::Seconds(1.0),
            op: HierarchyOpDoc::Markov { advance: 1 },
        });
        let pattern = compile_table(&doc, 0).unwrap();
        let hierarchy = pattern.hierarchy.clone().unwrap();
        let mut modulators = pattern.hierarchy_modulators;
        assert_eq!(modulators.len(), 1);

        // First firing lands on the tonic by construction.
        modulators[0].apply(&hierarchy);
        assert_eq!(lock(&hierarchy).chord.degrees, vec![0, 2, 4]);
        // Subsequent firings stay within the transition table's vocabulary.
        for _ in 0..20 {
            modulators[0].apply(&hierarchy);
            assert!(!lock(&hierarchy).chord.degrees.is_empty());
        }
    }

    #[test]
    fn interval_emitter_drives_modulator_cadence() {
        let mut doc = base_doc();
        doc.emitters.push(constant("clock", 2.0));
        doc.hierarchy_modulators.push(HierarchyModDoc {
            every: IntervalDoc::Emitter("clock".into()),
            op: HierarchyOpDoc::Transpose {
                n: 1,
                level: Level::Chord,
            },
        });
        let pattern = compile_table(&doc, 0).unwrap();
        assert_eq!(pattern.hierarchy_modulators[0].interval.seconds(), 2.0);
    }

    #[test]
    fn annotate_names_become_shadows() {
        let mut doc = base_doc();
        doc.tracks[0].annotate = vec!["sus".into(), "gap".into()];
        let pattern = compile_table(&doc, 0).unwrap();
        let names: Vec<&str> = pattern.tracks[0]
            .shadows
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["sus", "gap"]);
    }

    #[test]
    fn unknown_annotate_name_fails() {
        let mut doc = base_doc();
        doc.tracks[0].annotate = vec!["ghost".into()];
        assert!(matches!(
            compile_table(&doc, 0),
            Err(CompileError::UnknownEmitter(_))
        ));
    }
}
