//! Instantiation of emitter specifications into live generators.
//!
//! Nodes are built in topological order so every reference already exists.
//! A compiled [`Emitter`] is shared behind an `Arc`: tracks pull values,
//! modulators write parameters, and the annotation layer reads the last
//! value shadow without re-invoking the generator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::CompileError;

use super::graph::topo_sort;
use super::policy::{Gate, Latch, LATCH_WINDOW};
use super::source::SourceCore;
use super::{EmitterFn, EmitterSpec, OutputKind, UpdatePolicy};

struct Inner {
    core: SourceCore,
    rng: ChaCha8Rng,
    latch: Latch,
    gate: Option<(Arc<Emitter>, Gate)>,
    deps: Vec<Arc<Emitter>>,
}

/// A live, lazily-advancing value generator.
pub struct Emitter {
    name: String,
    output: OutputKind,
    inner: Mutex<Inner>,
    shadow: Mutex<Option<f64>>,
    params: Mutex<HashMap<String, f64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Emitter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self) -> OutputKind {
        self.output
    }

    /// Advance (subject to latch and gate) and return the next value.
    ///
    /// Dependencies are pulled recursively; the lock order follows the
    /// dependency edges, which the compiler guarantees are acyclic.
    pub fn pull(&self) -> f64 {
        let now = Instant::now();
        let mut inner = lock(&self.inner);

        if let Some(cached) = inner.latch.get(now) {
            return cached;
        }
        if let Some((_, gate)) = &inner.gate {
            if !gate.open(now) {
                if let Some(held) = self.last() {
                    return held;
                }
            }
        }

        let deps = inner.deps.clone();
        let dep_values: Vec<f64> = deps.iter().map(|d| d.pull()).collect();
        let params = lock(&self.params).clone();

        let mut value = {
            let Inner { core, rng, .. } = &mut *inner;
            core.advance(rng, &params, &dep_values)
        };
        if self.output.is_integer() {
            value = value.round();
        }

        inner.latch.put(now, value);
        if let Some((timer, gate)) = &mut inner.gate {
            let interval = timer.pull();
            gate.arm(now, interval);
        }
        *lock(&self.shadow) = Some(value);
        value
    }

    /// The most recent output, without advancing.
    pub fn last(&self) -> Option<f64> {
        *lock(&self.shadow)
    }

    /// Write a named mutable parameter. Returns `false` when this emitter
    /// does not expose that parameter.
    pub fn set_param(&self, name: &str, value: f64) -> bool {
        let mut params = lock(&self.params);
        match params.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Names of the exposed mutable parameters.
    pub fn param_names(&self) -> Vec<String> {
        lock(&self.params).keys().cloned().collect()
    }
}

/// The compiled emitter graph: name → live node.
#[derive(Clone, Default)]
pub struct EmitterSet {
    emitters: HashMap<String, Arc<Emitter>>,
}

impl EmitterSet {
    pub fn get(&self, name: &str) -> Result<&Arc<Emitter>, CompileError> {
        self.emitters
            .get(name)
            .ok_or_else(|| CompileError::UnknownEmitter(name.to_string()))
    }

    /// Look up an emitter that will be read as a float source.
    pub fn require_float(&self, name: &str) -> Result<Arc<Emitter>, CompileError> {
        let emitter = self.get(name)?;
        if emitter.output() != OutputKind::Float {
            return Err(CompileError::TypeMismatch {
                name: name.to_string(),
                expected: "float",
                found: emitter.output().name(),
            });
        }
        Ok(Arc::clone(emitter))
    }

    /// Look up an emitter that will be read as an integer source.
    pub fn require_int(&self, name: &str) -> Result<Arc<Emitter>, CompileError> {
        let emitter = self.get(name)?;
        if !emitter.output().is_integer() {
            return Err(CompileError::TypeMismatch {
                name: name.to_string(),
                expected: "int",
                found: emitter.output().name(),
            });
        }
        Ok(Arc::clone(emitter))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Emitter>)> {
        self.emitters.iter()
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

/// Compile emitter specifications into live generators.
///
/// Each node's random stream is seeded from the master seed and the spec's
/// declaration index, so a document plays identically for a given seed.
pub fn compile_emitters(specs: &[EmitterSpec], seed: u64) -> Result<EmitterSet, CompileError> {
    let order = topo_sort(specs)?;
    let mut set = EmitterSet::default();

    for index in order {
        let spec = &specs[index];
        let (core, params) = build_core(spec)?;

        let deps = match &spec.func {
            EmitterFn::Sum { sources } => sources
                .iter()
                .map(|s| set.get(s).map(Arc::clone))
                .collect::<Result<Vec<_>, _>>()?,
            EmitterFn::Reciprocal { source } => vec![Arc::clone(set.get(source)?)],
            EmitterFn::Index { source, .. } => vec![set.require_int(source)?],
            _ => Vec::new(),
        };

        let (latch, gate) = match &spec.update {
            UpdatePolicy::Each => (Latch::new(LATCH_WINDOW), None),
            UpdatePolicy::WaitingOn(timer) => {
                let timer = Arc::clone(set.get(timer)?);
                (Latch::disabled(), Some((timer, Gate::new())))
            }
        };

        let emitter = Arc::new(Emitter {
            name: spec.name.clone(),
            output: spec.output,
            inner: Mutex::new(Inner {
                core,
                rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64)),
                latch,
                gate,
                deps,
            }),
            shadow: Mutex::new(None),
            params: Mutex::new(params),
        });
        set.emitters.insert(spec.name.clone(), emitter);
    }

    Ok(set)
}

fn build_core(spec: &EmitterSpec) -> Result<(SourceCore, HashMap<String, f64>), CompileError> {
    let nonempty = |values: &[f64]| {
        if values.is_empty() {
            Err(CompileError::EmptyEmitter(spec.name.clone()))
        } else {
            Ok(())
        }
    };

    let mut params = HashMap::new();
    let core = match &spec.func {
        EmitterFn::Constant { value } => {
            params.insert("value".to_string(), *value);
            SourceCore::Constant
        }
        EmitterFn::Uniform { min, max } => {
            params.insert("min".to_string(), *min);
            params.insert("max".to_string(), *max);
            SourceCore::Uniform
        }
        EmitterFn::Exponential { mean } => {
            params.insert("mean".to_string(), *mean);
            SourceCore::Exponential
        }
        EmitterFn::Cycle { values } => {
            nonempty(values)?;
            SourceCore::Cycle {
                values: values.clone(),
                pos: 0,
            }
        }
        EmitterFn::Shuffle { values } => {
            nonempty(values)?;
            SourceCore::Shuffle {
                values: values.clone(),
                order: (0..values.len()).collect(),
                pos: values.len(), // reshuffle before the first draw
            }
        }
        EmitterFn::Choose { values } => {
            nonempty(values)?;
            SourceCore::Choose {
                values: values.clone(),
            }
        }
        EmitterFn::Fragments { fragments } => {
            if fragments.is_empty() || fragments.iter().any(Vec::is_empty) {
                return Err(CompileError::EmptyEmitter(spec.name.clone()));
            }
            SourceCore::Fragments {
                fragments: fragments.clone(),
                current: Vec::new(),
                pos: 0,
            }
        }
        EmitterFn::Index { values, .. } => {
            nonempty(values)?;
            SourceCore::Index {
                values: values.clone(),
            }
        }
        EmitterFn::Sum { .. } => SourceCore::Sum,
        EmitterFn::Reciprocal { .. } => SourceCore::Reciprocal,
    };
    Ok((core, params))
}
