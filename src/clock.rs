//! Timestamp sources for producers.
//!
//! Recorders take nanosecond timestamps. These clocks produce them either from
//! wall time or from a fixed frame cadence.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of nanosecond timestamps.
pub trait Clock: Send + Sync {
    /// Current timestamp in nanoseconds.
    fn timestamp(&self) -> i64;
}

#[derive(Debug, Default)]
struct RealtimeState {
    start: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

/// Wall clock whose first reading is zero.
///
/// Time spent paused is excluded from later readings.
#[derive(Debug, Default)]
pub struct RealtimeClock {
    state: Mutex<RealtimeState>,
}

impl RealtimeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause or resume the clock.
    pub fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match (paused, state.paused_at) {
            (true, None) => state.paused_at = Some(now),
            (false, Some(at)) => {
                state.paused_total += now.duration_since(at);
                state.paused_at = None;
            }
            _ => {}
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .paused_at
            .is_some()
    }
}

impl Clock for RealtimeClock {
    fn timestamp(&self) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = state.paused_at.unwrap_or_else(Instant::now);
        let start = *state.start.get_or_insert(now);
        let elapsed = now
            .saturating_duration_since(start)
            .saturating_sub(state.paused_total);
        i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Deterministic clock advancing `1 / frame_rate` per tick.
///
/// With auto-tick enabled every reading advances the clock after returning,
/// so successive readings are `0, 1/fps, 2/fps, ...`.
#[derive(Debug)]
pub struct FixedIntervalClock {
    frame_rate: f64,
    auto_tick: bool,
    ticks: AtomicI64,
}

impl FixedIntervalClock {
    /// Create an auto-ticking clock.
    pub fn new(frame_rate: f32) -> Self {
        Self {
            frame_rate: f64::from(frame_rate),
            auto_tick: true,
            ticks: AtomicI64::new(0),
        }
    }

    #[must_use]
    pub fn auto_tick(mut self, auto_tick: bool) -> Self {
        self.auto_tick = auto_tick;
        self
    }

    /// Advance the clock by one frame.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Interval between ticks in nanoseconds.
    pub fn interval(&self) -> f64 {
        1e9 / self.frame_rate
    }

    fn at(&self, ticks: i64) -> i64 {
        (ticks as f64 * self.interval()).round() as i64
    }
}

impl Clock for FixedIntervalClock {
    fn timestamp(&self) -> i64 {
        let ticks = if self.auto_tick {
            self.ticks.fetch_add(1, Ordering::Relaxed)
        } else {
            self.ticks.load(Ordering::Relaxed)
        };
        self.at(ticks)
    }
}
