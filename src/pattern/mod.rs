//! Declarative pattern documents and their compiled form.
//!
//! Three independent document shapes compile to the same runtime unit:
//! an absolute-beat score, an emitter table, and a raw note-event mapping
//! (the output of an external MIDI reader). Compilation is fallible with
//! named errors; the result is a [`CompiledPattern`] owned by the scheduler.

pub mod midi;
pub mod score;
pub mod table;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::emitter::{Emitter, EmitterSet, EmitterSpec};
use crate::error::CompileError;
use crate::harmony::{HarmonyEvent, HarmonyTimeline, Level, MarkovChords, PitchHierarchy};
use crate::sink::{NoteEvent, NoteSink};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Chromatic adjustment wins when both are given; only one perturbation can
/// apply per note.
pub(crate) fn perturbation(chroma: i32, shift: i32) -> crate::harmony::Perturbation {
    use crate::harmony::Perturbation;
    if chroma != 0 {
        Perturbation::Chromatic(chroma)
    } else if shift != 0 {
        Perturbation::Degree(shift)
    } else {
        Perturbation::None
    }
}

/// One playback step: simultaneous notes, how long they sustain, and how
/// long the track waits before the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackStep {
    pub notes: Vec<NoteEvent>,
    pub sustain_secs: f64,
    pub gap_secs: f64,
    /// Chord label at this step, when the pattern knows one.
    pub label: Option<String>,
}

/// Where a track's steps come from.
pub enum StepSource {
    /// A precompiled step list (score and midi shapes).
    Steps {
        steps: Vec<TrackStep>,
        looped: bool,
        pos: usize,
    },
    /// A live generator (table shape) pulling emitters per step.
    Live(Box<dyn FnMut() -> Option<TrackStep> + Send>),
}

impl StepSource {
    pub fn next(&mut self) -> Option<TrackStep> {
        match self {
            StepSource::Steps { steps, looped, pos } => {
                if steps.is_empty() {
                    return None;
                }
                if *pos >= steps.len() {
                    if !*looped {
                        return None;
                    }
                    *pos = 0;
                }
                let step = steps[*pos].clone();
                *pos += 1;
                Some(step)
            }
            StepSource::Live(generate) => generate(),
        }
    }
}

/// Where a preset modulator writes its value.
#[derive(Clone)]
pub enum ModTarget {
    /// A named numeric handle on the note sink.
    Control(String),
    /// A mutable parameter of another emitter (meta-modulation).
    EmitterParam { emitter: Arc<Emitter>, param: String },
}

/// A value-producing arrow applied just before a track fires a note.
#[derive(Clone)]
pub struct Modulator {
    pub name: String,
    pub emitter: Arc<Emitter>,
    pub target: ModTarget,
}

impl Modulator {
    pub fn apply(&self, sink: &dyn NoteSink) {
        let value = self.emitter.pull();
        match &self.target {
            ModTarget::Control(control) => sink.set_control(control, value),
            ModTarget::EmitterParam { emitter, param } => {
                emitter.set_param(param, value);
            }
        }
    }
}

/// A compiled, scheduler-owned track.
pub struct Track {
    pub name: String,
    pub source: StepSource,
    pub modulators: Vec<Modulator>,
    /// Emitters whose last values annotate this track's UI stream.
    pub shadows: Vec<(String, Arc<Emitter>)>,
}

/// How often a hierarchy modulator fires.
pub enum IntervalSource {
    Seconds(f64),
    Emitter(Arc<Emitter>),
}

impl IntervalSource {
    pub fn seconds(&self) -> f64 {
        match self {
            IntervalSource::Seconds(secs) => *secs,
            IntervalSource::Emitter(emitter) => emitter.pull(),
        }
        .max(0.0)
    }
}

/// The mutation a hierarchy modulator applies when its timer fires.
pub enum HierarchyModOp {
    Transpose { n: i32, level: Level },
    Rotate { n: i32, level: Level },
    Lattice { n: i32 },
    /// Advance the Markov chain `advance` times and keep the last chord.
    /// Non-positive counts are a no-op.
    Markov { advance: i32, chain: MarkovChords },
}

/// A timer task specification mutating the shared hierarchy.
pub struct HierarchyModulator {
    pub interval: IntervalSource,
    pub op: HierarchyModOp,
}

impl HierarchyModulator {
    /// Apply one firing to the shared hierarchy.
    pub fn apply(&mut self, hierarchy: &Mutex<PitchHierarchy>) {
        let mut state = lock(hierarchy);
        match &mut self.op {
            HierarchyModOp::Transpose { n, level } => state.transpose(*n, *level),
            HierarchyModOp::Rotate { n, level } => state.rotate(*n, *level),
            HierarchyModOp::Lattice { n } => state.lattice(*n),
            HierarchyModOp::Markov { advance, chain } => {
                if let Some(chord) = chain.advance(*advance) {
                    state.chord = chord;
                }
            }
        }
    }
}

/// Drives the score chord-label timer task.
pub struct LabelClock {
    pub timeline: HarmonyTimeline,
    pub seconds_per_beat: f64,
    pub looped: bool,
}

/// A fully compiled pattern, ready for the scheduler.
pub struct CompiledPattern {
    pub name: String,
    pub tracks: Vec<Track>,
    pub hierarchy: Option<Arc<Mutex<PitchHierarchy>>>,
    pub hierarchy_modulators: Vec<HierarchyModulator>,
    pub emitters: EmitterSet,
    pub label_clock: Option<LabelClock>,
}

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_octave() -> i32 {
    4
}

fn default_velocity() -> f64 {
    0.8
}

fn default_seconds_per_beat() -> f64 {
    0.5
}

fn default_sustain_fraction() -> f64 {
    0.9
}

fn default_level() -> Level {
    Level::Chord
}

fn default_advance() -> i32 {
    1
}

/// A pattern document: one of the three shapes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternDoc {
    Score(ScoreDoc),
    Table(TableDoc),
    Midi(MidiDoc),
}

/// Absolute-beat score: a key, chord/key events, and per-track note lists.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoreDoc {
    #[serde(default)]
    pub name: Option<String>,
    pub key: String,
    pub total_beats: f64,
    #[serde(default = "default_seconds_per_beat")]
    pub seconds_per_beat: f64,
    #[serde(default = "default_sustain_fraction")]
    pub sustain_fraction: f64,
    #[serde(default = "default_true", rename = "loop")]
    pub looped: bool,
    #[serde(default)]
    pub events: Vec<HarmonyEvent>,
    pub tracks: Vec<ScoreTrackDoc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoreTrackDoc {
    pub name: String,
    #[serde(default = "default_octave")]
    pub octave: i32,
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    pub notes: Vec<ScoreNote>,
}

/// One score entry: what to sound, for how many beats.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoreNote {
    #[serde(flatten)]
    pub kind: ScoreNoteKind,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum ScoreNoteKind {
    /// Silence for the duration.
    Rest,
    /// Extend the previous event instead of re-striking it.
    Hold,
    /// Every voiced tone of the current chord.
    CurrentChord,
    /// One voiced chord tone, optionally perturbed.
    ChordTone {
        index: i32,
        #[serde(default)]
        chroma: i32,
        #[serde(default)]
        shift: i32,
    },
    /// A scale degree, optionally chromatically perturbed.
    ScaleDegree {
        degree: i32,
        #[serde(default)]
        chroma: i32,
    },
    /// A fixed pitch by name, e.g. `"Eb4"`.
    Absolute { pitch: String },
}

/// Emitter table: emitter rows, an optional shared hierarchy with modulator
/// rows, note materials, preset modulators, and track assemblies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableDoc {
    #[serde(default)]
    pub name: Option<String>,
    /// Master seed baked into the document; takes precedence over the seed
    /// passed at compile time.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub emitters: Vec<EmitterSpec>,
    #[serde(default)]
    pub hierarchy: Option<HierarchyDoc>,
    #[serde(default)]
    pub hierarchy_modulators: Vec<HierarchyModDoc>,
    #[serde(default)]
    pub materials: Vec<MaterialDoc>,
    #[serde(default)]
    pub modulators: Vec<ModulatorDoc>,
    pub tracks: Vec<TableTrackDoc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HierarchyDoc {
    pub key: String,
    /// Initial chord as a roman-numeral symbol.
    #[serde(default)]
    pub roman: Option<String>,
    /// Initial chord as raw degrees (overrides `roman` when present).
    #[serde(default)]
    pub degrees: Option<Vec<i32>>,
    #[serde(default)]
    pub inversion: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HierarchyModDoc {
    /// Interval in seconds, or the name of a float emitter providing it.
    pub every: IntervalDoc,
    #[serde(flatten)]
    pub op: HierarchyOpDoc,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum IntervalDoc {
    Seconds(f64),
    Emitter(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "apply", rename_all = "snake_case")]
pub enum HierarchyOpDoc {
    Transpose {
        n: i32,
        #[serde(default = "default_level")]
        level: Level,
    },
    Rotate {
        n: i32,
        #[serde(default = "default_level")]
        level: Level,
    },
    Lattice { n: i32 },
    Markov {
        #[serde(default = "default_advance")]
        advance: i32,
    },
}

/// A note material: an ordered list of steps, each zero or more tones.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaterialDoc {
    pub name: String,
    #[serde(default = "default_level")]
    pub level: Level,
    pub steps: Vec<Vec<MaterialTone>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MaterialTone {
    Plain(i32),
    Detailed {
        tone: i32,
        #[serde(default)]
        chroma: i32,
        #[serde(default)]
        shift: i32,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModulatorDoc {
    pub name: String,
    /// Emitter producing the value to write.
    pub emitter: String,
    /// Sink control handle to write. Exactly one of `control` and the
    /// `target_emitter`/`param` pair must be present.
    #[serde(default)]
    pub control: Option<String>,
    /// Another emitter whose parameter to write (meta-modulation).
    #[serde(default)]
    pub target_emitter: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableTrackDoc {
    pub name: String,
    pub material: String,
    /// Float emitter for sustain seconds.
    pub sustain: String,
    /// Float emitter for the inter-event gap seconds.
    pub gap: String,
    #[serde(default)]
    pub octave: Option<OctaveDoc>,
    /// Fixed velocity, or the name of a float emitter providing it per note.
    #[serde(default)]
    pub velocity: Option<VelocityDoc>,
    #[serde(default)]
    pub modulators: Vec<String>,
    /// Emitters whose last values annotate this track.
    #[serde(default)]
    pub annotate: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OctaveDoc {
    Fixed(i32),
    Emitter(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VelocityDoc {
    Fixed(f64),
    Emitter(String),
}

/// Raw note-event mapping — the already-decoded output of a MIDI reader:
/// parallel arrays of simultaneous-note groups, sustain seconds, and gap
/// seconds, consumed identically to procedurally generated tracks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiDoc {
    #[serde(default)]
    pub name: Option<String>,
    pub tracks: Vec<MidiTrackDoc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiTrackDoc {
    pub name: String,
    pub notes: Vec<Vec<MidiNoteDoc>>,
    pub sustains: Vec<f64>,
    pub gaps: Vec<f64>,
    #[serde(default = "default_true", rename = "loop")]
    pub looped: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiNoteDoc {
    pub pitch: MidiPitchDoc,
    #[serde(default = "default_velocity")]
    pub velocity: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MidiPitchDoc {
    Number(u8),
    Name(String),
}

/// Compile any document shape with the given master seed.
pub fn compile(doc: &PatternDoc, seed: u64) -> Result<CompiledPattern, CompileError> {
    match doc {
        PatternDoc::Score(score) => score::compile_score(score),
        PatternDoc::Table(table) => table::compile_table(table, table.seed.unwrap_or(seed)),
        PatternDoc::Midi(midi) => midi::compile_midi(midi),
    }
}

/// Parse and compile a JSON pattern document.
pub fn compile_str(json: &str, seed: u64) -> Result<CompiledPattern, CompileError> {
    let doc: PatternDoc = serde_json::from_str(json)?;
    compile(&doc, seed)
}
