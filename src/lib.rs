//! Tonnetz — a generative harmony and pattern scheduling engine.
//!
//! Patterns are declarative JSON documents (scores, emitter tables, or raw
//! note-event mappings) compiled into concurrent playback units. Harmony is
//! modeled as a key/chord hierarchy transformed by the `T`/`t`/`L` operator
//! family, with a roman-numeral parser and a Markov chord generator on top.
//! Sound never happens here: the scheduler drives a caller-provided
//! [`sink::NoteSink`].

pub mod emitter;
pub mod error;
pub mod harmony;
pub mod pattern;
pub mod sched;
pub mod sink;
