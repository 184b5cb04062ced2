//! Concurrent playback of a compiled pattern.
//!
//! Each track runs on its own thread, as does each hierarchy modulator and
//! the score chord-label clock. Pause and teardown are cooperative: shared
//! atomic flags are polled at step boundaries and after every sleep slice,
//! so nothing blocks longer than [`POLL`]. Note on/off pairs run on
//! fire-and-forget threads that are never joined — teardown broadcasts an
//! all-notes-off instead of waiting for in-flight sustains.

pub mod annotate;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::harmony::PitchHierarchy;
use crate::pattern::{CompiledPattern, HierarchyModulator, LabelClock, Track};
use crate::sink::NoteSink;

pub use annotate::TrackAnnotation;

use annotate::{annotation_channel, AnnotationPublisher};

/// Pause/cancel poll granularity.
const POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sleep up to `secs`, waking early on cancellation. Returns `false` when
/// cancelled.
fn sleep_interruptible(cancelled: &AtomicBool, secs: f64) -> bool {
    let mut remaining = Duration::from_secs_f64(secs.max(0.0));
    while !remaining.is_zero() {
        if cancelled.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(POLL);
        thread::sleep(slice);
        remaining -= slice;
    }
    !cancelled.load(Ordering::Relaxed)
}

/// Owns playback of one compiled pattern.
///
/// Lifecycle: `Idle` → [`play`](Self::play) → `Playing` ⇄ `Paused` →
/// [`stop`](Self::stop) → `Stopped`. A scheduler plays once; compiling a new
/// pattern means a new scheduler.
pub struct Scheduler {
    sink: Arc<dyn NoteSink>,
    pattern: Option<CompiledPattern>,
    state: PlayState,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    streams: Vec<(String, Receiver<TrackAnnotation>)>,
    label: Arc<Mutex<Option<String>>>,
    hierarchy: Option<Arc<Mutex<PitchHierarchy>>>,
}

impl Scheduler {
    pub fn new(pattern: CompiledPattern, sink: Arc<dyn NoteSink>) -> Self {
        Self {
            sink,
            pattern: Some(pattern),
            state: PlayState::Idle,
            paused: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
            streams: Vec::new(),
            label: Arc::new(Mutex::new(None)),
            hierarchy: None,
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    /// Annotation streams, one per track, available once playing. A stream
    /// disconnects when its track finishes or the scheduler stops.
    pub fn annotations(&self) -> &[(String, Receiver<TrackAnnotation>)] {
        &self.streams
    }

    /// The chord label currently in effect, when the pattern tracks one.
    pub fn chord_label(&self) -> Option<String> {
        if let Some(label) = lock(&self.label).clone() {
            return Some(label);
        }
        self.hierarchy.as_ref().map(|h| lock(h).chord_label())
    }

    /// Start playback. Only valid from `Idle`; anything else is a logged
    /// no-op.
    pub fn play(&mut self) {
        if self.state != PlayState::Idle {
            warn!(state = ?self.state, "play ignored, scheduler is not idle");
            return;
        }
        let Some(pattern) = self.pattern.take() else {
            return;
        };
        info!(pattern = %pattern.name, tracks = pattern.tracks.len(), "starting playback");

        self.hierarchy = pattern.hierarchy.clone();
        self.state = PlayState::Playing;

        if let Some(clock) = pattern.label_clock {
            let label = Arc::clone(&self.label);
            let paused = Arc::clone(&self.paused);
            let cancelled = Arc::clone(&self.cancelled);
            self.handles
                .push(thread::spawn(move || label_task(clock, label, paused, cancelled)));
        }

        if let Some(hierarchy) = &self.hierarchy {
            for modulator in pattern.hierarchy_modulators {
                let hierarchy = Arc::clone(hierarchy);
                let paused = Arc::clone(&self.paused);
                let cancelled = Arc::clone(&self.cancelled);
                self.handles.push(thread::spawn(move || {
                    modulator_task(modulator, hierarchy, paused, cancelled)
                }));
            }
        }

        for track in pattern.tracks {
            let (publisher, receiver) = annotation_channel();
            self.streams.push((track.name.clone(), receiver));
            let sink = Arc::clone(&self.sink);
            let paused = Arc::clone(&self.paused);
            let cancelled = Arc::clone(&self.cancelled);
            self.handles.push(thread::spawn(move || {
                track_task(track, publisher, sink, paused, cancelled)
            }));
        }
    }

    /// Pause or resume. Pausing broadcasts an immediate all-notes-off;
    /// track positions and emitter states are frozen, not reset.
    pub fn set_paused(&mut self, pause: bool) {
        match (self.state, pause) {
            (PlayState::Playing, true) => {
                self.paused.store(true, Ordering::Relaxed);
                self.sink.all_notes_off();
                self.state = PlayState::Paused;
                info!("paused");
            }
            (PlayState::Paused, false) => {
                self.paused.store(false, Ordering::Relaxed);
                self.state = PlayState::Playing;
                info!("resumed");
            }
            _ => debug!(state = ?self.state, pause, "pause request ignored"),
        }
    }

    /// Tear down: cancel every task, join the track and modulator threads,
    /// and broadcast all-notes-off. Idempotent.
    pub fn stop(&mut self) {
        if self.state == PlayState::Stopped {
            return;
        }
        self.cancelled.store(true, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.sink.all_notes_off();
        self.state = PlayState::Stopped;
        info!("stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn track_task(
    mut track: Track,
    publisher: AnnotationPublisher,
    sink: Arc<dyn NoteSink>,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
) {
    loop {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        if paused.load(Ordering::Relaxed) {
            thread::sleep(POLL);
            continue;
        }

        let Some(step) = track.source.next() else {
            debug!(track = %track.name, "track finished");
            break;
        };

        for modulator in &track.modulators {
            modulator.apply(sink.as_ref());
        }

        publisher.publish(TrackAnnotation {
            track: track.name.clone(),
            label: step.label.clone(),
            notes: step.notes.clone(),
            sustain_secs: step.sustain_secs,
            gap_secs: step.gap_secs,
            emitters: track
                .shadows
                .iter()
                .map(|(name, emitter)| (name.clone(), emitter.last()))
                .collect(),
        });

        if !step.notes.is_empty() {
            let sink = Arc::clone(&sink);
            let notes = step.notes;
            let sustain = Duration::from_secs_f64(step.sustain_secs.max(0.0));
            thread::spawn(move || {
                sink.note_on(&notes);
                thread::sleep(sustain);
                sink.note_off(&notes);
            });
        }

        if !sleep_interruptible(&cancelled, step.gap_secs) {
            break;
        }
    }
}

fn modulator_task(
    mut modulator: HierarchyModulator,
    hierarchy: Arc<Mutex<PitchHierarchy>>,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
) {
    loop {
        // Clamp to the poll granularity so a zero-valued interval emitter
        // cannot spin the thread.
        let interval = modulator.interval.seconds().max(POLL.as_secs_f64());
        if !sleep_interruptible(&cancelled, interval) {
            break;
        }
        if paused.load(Ordering::Relaxed) {
            continue;
        }
        modulator.apply(&hierarchy);
    }
}

fn label_task(
    clock: LabelClock,
    label: Arc<Mutex<Option<String>>>,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
) {
    let mut beat = 0.0;
    *lock(&label) = Some(clock.timeline.state_at(beat, clock.looped).chord_label());
    loop {
        if !sleep_interruptible(&cancelled, clock.seconds_per_beat.max(0.01)) {
            break;
        }
        if paused.load(Ordering::Relaxed) {
            continue;
        }
        beat += 1.0;
        if !clock.looped && beat > clock.timeline.total_beats() {
            break;
        }
        *lock(&label) = Some(clock.timeline.state_at(beat, clock.looped).chord_label());
    }
}
