//! Compile-time errors for pattern and emitter compilation.
//!
//! Every variant carries the offending name(s); a pattern that hits any of
//! these fails to compile. Recoverable conditions (unparseable roman
//! symbols, out-of-range notes) are not errors — see the harmony and
//! pattern modules for the degrade-gracefully paths.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unknown emitter '{0}'")]
    UnknownEmitter(String),

    #[error("duplicate emitter name '{0}'")]
    DuplicateEmitter(String),

    #[error("cyclic emitter dependencies: {}", .0.join(", "))]
    CyclicEmitters(Vec<String>),

    #[error("emitter '{name}' has output type {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("emitter '{0}' has no values to emit")]
    EmptyEmitter(String),

    #[error("unknown note material '{0}'")]
    UnknownMaterial(String),

    #[error("note material '{0}' has no steps")]
    EmptyMaterial(String),

    #[error("unknown modulator '{0}'")]
    UnknownModulator(String),

    #[error("modulator '{0}' must name exactly one target (control or emitter param)")]
    InvalidModulator(String),

    #[error("emitter '{emitter}' has no parameter '{param}'")]
    UnknownParam { emitter: String, param: String },

    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("unknown key '{0}'")]
    UnknownKey(String),

    #[error("invalid pattern document: {0}")]
    Document(#[from] serde_json::Error),
}
