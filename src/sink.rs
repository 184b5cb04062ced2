//! The note sink boundary.
//!
//! The scheduler never renders sound — it hands note-on/note-off batches and
//! named control writes to a [`NoteSink`], the way a caller-provided render
//! function keeps scheduling logic testable without audio hardware.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One sounding note: pitch plus velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI note number (0–127).
    pub pitch: u8,
    /// Velocity in the range 0.0–1.0.
    pub velocity: f64,
}

impl NoteEvent {
    pub fn new(pitch: u8, velocity: f64) -> Self {
        Self { pitch, velocity }
    }
}

/// Receiver of scheduled note events and modulator control writes.
///
/// Implementations must be cheap and non-blocking; they are called from
/// per-note fire-and-forget tasks.
pub trait NoteSink: Send + Sync {
    /// Start sounding a group of simultaneous notes.
    fn note_on(&self, notes: &[NoteEvent]);
    /// Stop sounding a group of notes previously passed to `note_on`.
    fn note_off(&self, notes: &[NoteEvent]);
    /// Write a named numeric handle (modulators call this before a note).
    fn set_control(&self, name: &str, value: f64);
    /// Silence everything immediately (pause and teardown path).
    fn all_notes_off(&self);
}

/// A sink that logs through `tracing` — the default for the CLI.
#[derive(Debug, Default)]
pub struct LogSink;

impl NoteSink for LogSink {
    fn note_on(&self, notes: &[NoteEvent]) {
        info!(?notes, "note on");
    }

    fn note_off(&self, notes: &[NoteEvent]) {
        debug!(?notes, "note off");
    }

    fn set_control(&self, name: &str, value: f64) {
        debug!(name, value, "control");
    }

    fn all_notes_off(&self) {
        info!("all notes off");
    }
}

/// What a [`MemorySink`] recorded, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    NoteOn(Vec<NoteEvent>),
    NoteOff(Vec<NoteEvent>),
    Control(String, f64),
    AllNotesOff,
}

/// A sink that records every call — for tests and headless inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    calls: Mutex<Vec<SinkCall>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.lock().clone()
    }

    pub fn note_on_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|c| matches!(c, SinkCall::NoteOn(_)))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NoteSink for MemorySink {
    fn note_on(&self, notes: &[NoteEvent]) {
        self.lock().push(SinkCall::NoteOn(notes.to_vec()));
    }

    fn note_off(&self, notes: &[NoteEvent]) {
        self.lock().push(SinkCall::NoteOff(notes.to_vec()));
    }

    fn set_control(&self, name: &str, value: f64) {
        self.lock().push(SinkCall::Control(name.to_string(), value));
    }

    fn all_notes_off(&self) {
        self.lock().push(SinkCall::AllNotesOff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let notes = vec![NoteEvent::new(60, 0.8)];
        sink.note_on(&notes);
        sink.set_control("cutoff", 0.5);
        sink.note_off(&notes);
        sink.all_notes_off();

        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::NoteOn(notes.clone()),
                SinkCall::Control("cutoff".into(), 0.5),
                SinkCall::NoteOff(notes),
                SinkCall::AllNotesOff,
            ]
        );
        assert_eq!(sink.note_on_count(), 1);
    }
}
