//! Update policies — latching and waiting gates.
//!
//! A latch coalesces near-simultaneous reads: within [`LATCH_WINDOW`] of the
//! last advancement, readers observe the cached value and the generator does
//! not advance. A gate holds advancement behind a timer whose interval comes
//! from another emitter, so otherwise-independent emitters can be forced to
//! change in lockstep.

use std::time::{Duration, Instant};

/// How long multiple readers coalesce onto one value.
pub const LATCH_WINDOW: Duration = Duration::from_millis(15);

/// Read-coalescing latch over the most recent value.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    window: Option<Duration>,
    last: Option<(Instant, f64)>,
}

impl Latch {
    pub fn new(window: Duration) -> Self {
        Self {
            window: Some(window),
            last: None,
        }
    }

    /// A latch that never caches (used by gated emitters, whose cadence the
    /// gate already controls).
    pub fn disabled() -> Self {
        Self {
            window: None,
            last: None,
        }
    }

    /// The cached value, when `now` is still inside the window.
    pub fn get(&self, now: Instant) -> Option<f64> {
        let window = self.window?;
        let (stamp, value) = self.last?;
        if now.duration_since(stamp) < window {
            Some(value)
        } else {
            None
        }
    }

    pub fn put(&mut self, now: Instant, value: f64) {
        if self.window.is_some() {
            self.last = Some((now, value));
        }
    }
}

/// Timer gate: advancement is allowed only once the deadline has passed.
/// The next deadline comes from the timer emitter's value, in seconds.
#[derive(Debug, Clone)]
pub struct Gate {
    deadline: Option<Instant>,
}

impl Gate {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Whether the emitter may advance at `now`. The very first read always
    /// may — there is no value to hold yet.
    pub fn open(&self, now: Instant) -> bool {
        match self.deadline {
            None => true,
            Some(deadline) => now >= deadline,
        }
    }

    /// Arm the gate for the next `interval_secs` seconds. Non-positive
    /// intervals leave the gate open.
    pub fn arm(&mut self, now: Instant, interval_secs: f64) {
        self.deadline = if interval_secs > 0.0 {
            Some(now + Duration::from_secs_f64(interval_secs))
        } else {
            None
        };
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
