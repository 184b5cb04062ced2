//! Generator cores — the stateful value-production side of an emitter.
//!
//! A [`SourceCore`] is pure bookkeeping: it gets a random stream, the
//! current mutable parameters, and the already-pulled values of its
//! dependencies, and produces the next value. Latching, gating, and
//! dependency pulling live in the compiled wrapper.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// The stateful generation core of one emitter.
#[derive(Debug, Clone)]
pub enum SourceCore {
    Constant,
    Uniform,
    Exponential,
    Cycle { values: Vec<f64>, pos: usize },
    Shuffle { values: Vec<f64>, order: Vec<usize>, pos: usize },
    Choose { values: Vec<f64> },
    Fragments { fragments: Vec<Vec<f64>>, current: Vec<f64>, pos: usize },
    Index { values: Vec<f64> },
    Sum,
    Reciprocal,
}

impl SourceCore {
    /// Produce the next value.
    ///
    /// `params` carries the live-reparameterizable knobs (`value`, `min`,
    /// `max`, `mean`); `deps` carries one pulled value per referenced
    /// emitter, in reference order.
    pub fn advance(
        &mut self,
        rng: &mut ChaCha8Rng,
        params: &HashMap<String, f64>,
        deps: &[f64],
    ) -> f64 {
        match self {
            SourceCore::Constant => param(params, "value", 0.0),
            SourceCore::Uniform => {
                let min = param(params, "min", 0.0);
                let max = param(params, "max", 1.0);
                if max > min {
                    rng.gen_range(min..max)
                } else {
                    min
                }
            }
            SourceCore::Exponential => {
                let mean = param(params, "mean", 1.0);
                let u: f64 = 1.0 - rng.gen::<f64>(); // (0, 1]
                -u.ln() * mean
            }
            SourceCore::Cycle { values, pos } => {
                let v = values[*pos % values.len()];
                *pos = (*pos + 1) % values.len();
                v
            }
            SourceCore::Shuffle { values, order, pos } => {
                if *pos >= order.len() {
                    order.shuffle(rng);
                    *pos = 0;
                }
                let v = values[order[*pos]];
                *pos += 1;
                v
            }
            SourceCore::Choose { values } => {
                values[rng.gen_range(0..values.len())]
            }
            SourceCore::Fragments {
                fragments,
                current,
                pos,
            } => {
                if *pos >= current.len() {
                    *current = fragments[rng.gen_range(0..fragments.len())].clone();
                    *pos = 0;
                }
                let v = current[*pos];
                *pos += 1;
                v
            }
            SourceCore::Index { values } => {
                let idx = (deps[0].round() as i64).rem_euclid(values.len() as i64);
                values[idx as usize]
            }
            SourceCore::Sum => deps.iter().sum(),
            SourceCore::Reciprocal => {
                let v = deps[0];
                if v == 0.0 {
                    0.0
                } else {
                    1.0 / v
                }
            }
        }
    }
}

fn param(params: &HashMap<String, f64>, name: &str, fallback: f64) -> f64 {
    params.get(name).copied().unwrap_or(fallback)
}
