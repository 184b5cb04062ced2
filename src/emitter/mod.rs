//! Named lazy value generators and their graph compiler.
//!
//! An emitter specification declares an output type, a generation function,
//! and an update policy; specifications may reference each other (as summed
//! inputs, as an index source, or as a gating timer). The compiler resolves
//! the references into a topologically ordered set of live generators — see
//! [`compile::compile_emitters`].

pub mod compile;
pub mod graph;
pub mod policy;
pub mod source;

use serde::{Deserialize, Serialize};

pub use compile::{compile_emitters, Emitter, EmitterSet};
pub use policy::LATCH_WINDOW;

/// What an emitter's values mean to its consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Float,
    Int,
    Octave,
}

impl OutputKind {
    pub fn name(self) -> &'static str {
        match self {
            OutputKind::Float => "float",
            OutputKind::Int => "int",
            OutputKind::Octave => "octave",
        }
    }

    /// Integer-valued kinds round their outputs.
    pub fn is_integer(self) -> bool {
        matches!(self, OutputKind::Int | OutputKind::Octave)
    }
}

/// The generation function of an emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fn", rename_all = "snake_case")]
pub enum EmitterFn {
    /// Fixed value (still live-reparameterizable through the `value` param).
    Constant { value: f64 },
    /// Uniform random in `[min, max)`.
    Uniform { min: f64, max: f64 },
    /// Exponential random with the given mean.
    Exponential { mean: f64 },
    /// In-order cyclic list traversal.
    Cycle { values: Vec<f64> },
    /// Shuffled traversal, no repeats within a cycle.
    Shuffle { values: Vec<f64> },
    /// Fully random list choice.
    Choose { values: Vec<f64> },
    /// Pick a random fragment, emit its values one at a time, repeat.
    Fragments { fragments: Vec<Vec<f64>> },
    /// Use another int emitter's output to index into a fixed list.
    Index { source: String, values: Vec<f64> },
    /// Sum of several sources.
    Sum { sources: Vec<String> },
    /// Reciprocal of one source.
    Reciprocal { source: String },
}

/// When an emitter is allowed to advance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Advance on every read, with a short latch so near-simultaneous
    /// readers coalesce onto one value.
    #[default]
    Each,
    /// Advance only when a timer driven by the named emitter expires;
    /// in between, reads observe the last value.
    WaitingOn(String),
}

/// A named emitter specification, as written in pattern documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterSpec {
    pub name: String,
    #[serde(default)]
    pub output: OutputKind,
    #[serde(flatten)]
    pub func: EmitterFn,
    #[serde(default)]
    pub update: UpdatePolicy,
}

impl EmitterSpec {
    /// Names of every emitter this spec references: direct inputs, the
    /// index source, and the waiting-gate timer.
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = match &self.func {
            EmitterFn::Sum { sources } => sources.iter().map(String::as_str).collect(),
            EmitterFn::Reciprocal { source } | EmitterFn::Index { source, .. } => {
                vec![source.as_str()]
            }
            _ => Vec::new(),
        };
        if let UpdatePolicy::WaitingOn(timer) = &self.update {
            refs.push(timer.as_str());
        }
        refs
    }
}
