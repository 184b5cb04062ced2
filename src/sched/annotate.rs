//! Per-track annotation streams for UI consumers.
//!
//! Each playing track publishes a snapshot per step. The channel keeps only
//! the freshest few entries: a slow or absent UI must never back-pressure
//! the scheduler, so on a full channel the oldest entry is discarded.
//! Dropping the publisher (track teardown) disconnects the stream, which is
//! how consumers learn playback ended.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::sink::NoteEvent;

/// How many annotations may queue before old ones are dropped.
const DEPTH: usize = 8;

/// What one track step looked like, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackAnnotation {
    pub track: String,
    /// Chord label at this step, when the pattern knows one.
    pub label: Option<String>,
    pub notes: Vec<NoteEvent>,
    pub sustain_secs: f64,
    pub gap_secs: f64,
    /// Last values of the track's shadowed emitters, in declared order.
    pub emitters: Vec<(String, Option<f64>)>,
}

/// Sending side, owned by one track thread.
pub struct AnnotationPublisher {
    tx: Sender<TrackAnnotation>,
    rx: Receiver<TrackAnnotation>,
}

impl AnnotationPublisher {
    /// Publish, discarding the oldest queued entry when the channel is full.
    pub fn publish(&self, annotation: TrackAnnotation) {
        let mut pending = annotation;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    let _ = self.rx.try_recv();
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// A publisher/subscriber pair for one track.
pub fn annotation_channel() -> (AnnotationPublisher, Receiver<TrackAnnotation>) {
    let (tx, rx) = bounded(DEPTH);
    let publisher = AnnotationPublisher {
        tx,
        rx: rx.clone(),
    };
    (publisher, rx)
}
