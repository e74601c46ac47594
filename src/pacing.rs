//! Pacing: mapping producer timestamps onto container cadence.
//!
//! Fixed-rate formats (MP4, HEVC, WEBM) get exactly one frame per output
//! tick. A committed frame is held until a later frame arrives, and is
//! emitted once for every tick in between, so a producer stall turns into
//! duplicated frames rather than a gap. GIF uses each frame's own delay,
//! clamped below. Audio passes through unchanged but must never go
//! backwards.
//!
//! Tick rule: `tick(ts) = round_half_up((ts - t0) * fps / 1e9)` where `t0`
//! is the first video timestamp. A frame whose tick is not after the held
//! frame's tick replaces the held content in place.

use thiserror::Error;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Longest producer stall the fixed-rate pacer fills with duplicates.
pub const MAX_STALL_TICKS: i64 = 1 << 18;

/// Producer clock errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacingError {
    #[error("audio timestamp went backwards: {previous} -> {current}")]
    AudioBackwards { previous: i64, current: i64 },

    #[error("video timestamp {timestamp} is out of range of the timeline starting at {origin}")]
    TimestampOutOfRange { origin: i64, timestamp: i64 },

    #[error("video stalled for {ticks} frame intervals (limit {limit})")]
    StallTooLong { ticks: i64, limit: i64 },
}

/// A frame placed on the output timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Paced<T> {
    pub item: T,
    /// Output timestamp in nanoseconds, relative to the first frame.
    pub timestamp: i64,
    /// Time the frame stays on screen, in nanoseconds.
    pub duration: i64,
    /// Whether this emission re-uses the previous frame's content.
    pub duplicate: bool,
}

fn relative_to(origin: i64, timestamp: i64) -> Result<i64, PacingError> {
    timestamp
        .checked_sub(origin)
        .ok_or(PacingError::TimestampOutOfRange { origin, timestamp })
}

/// Constant frame rate pacer.
#[derive(Debug)]
pub struct FixedRatePacer<T> {
    frame_rate: f64,
    origin: Option<i64>,
    held: Option<(i64, T)>,
    duplicates: u64,
}

impl<T: Clone> FixedRatePacer<T> {
    pub fn new(frame_rate: f32) -> Self {
        Self {
            frame_rate: f64::from(frame_rate),
            origin: None,
            held: None,
            duplicates: 0,
        }
    }

    /// Output tick for a producer timestamp.
    pub fn tick_for(&self, timestamp: i64) -> Result<i64, PacingError> {
        let origin = self.origin.unwrap_or(timestamp);
        let ticks = relative_to(origin, timestamp)? as f64 * self.frame_rate / NANOS_PER_SEC;
        let tick = (ticks + 0.5).floor();
        if !tick.is_finite() || tick.abs() >= i64::MAX as f64 {
            return Err(PacingError::TimestampOutOfRange { origin, timestamp });
        }
        Ok(tick as i64)
    }

    /// Output timestamp of a tick in nanoseconds.
    pub fn tick_timestamp(&self, tick: i64) -> i64 {
        (tick as f64 * NANOS_PER_SEC / self.frame_rate).round() as i64
    }

    /// Number of re-emitted frames so far.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Accept a frame and return every frame whose ticks are now settled.
    ///
    /// A gap of more than [`MAX_STALL_TICKS`] is an error; the held frame
    /// stays in place.
    pub fn push(&mut self, timestamp: i64, item: T) -> Result<Vec<Paced<T>>, PacingError> {
        let tick = self.tick_for(timestamp)?;
        self.origin.get_or_insert(timestamp);

        let Some((held_tick, held_item)) = self.held.take() else {
            self.held = Some((tick.max(0), item));
            return Ok(Vec::new());
        };

        if tick <= held_tick {
            // Same or earlier slot: newest content wins, the timeline holds.
            self.held = Some((held_tick, item));
            return Ok(Vec::new());
        }

        // held_tick >= 0 and tick > held_tick, so the difference fits
        let gap = tick - held_tick;
        if gap > MAX_STALL_TICKS {
            self.held = Some((held_tick, held_item));
            return Err(PacingError::StallTooLong {
                ticks: gap,
                limit: MAX_STALL_TICKS,
            });
        }

        let out = self.emit(held_tick, tick, held_item);
        self.held = Some((tick, item));
        Ok(out)
    }

    /// Emit the held frame once and reset.
    pub fn finish(&mut self) -> Option<Paced<T>> {
        let (tick, item) = self.held.take()?;
        let mut out = self.emit(tick, tick + 1, item);
        out.pop()
    }

    fn emit(&mut self, from: i64, to: i64, item: T) -> Vec<Paced<T>> {
        let count = (to - from) as usize;
        if count > 1 {
            self.duplicates += count as u64 - 1;
            tracing::debug!("Pacing: repeating frame {} times to fill a stall", count - 1);
        }
        let mut out = Vec::with_capacity(count);
        for tick in from..to {
            let timestamp = self.tick_timestamp(tick);
            out.push(Paced {
                item: item.clone(),
                timestamp,
                duration: self.tick_timestamp(tick + 1) - timestamp,
                duplicate: tick != from,
            });
        }
        out
    }
}

/// Variable-delay pacer for GIF.
///
/// A frame is released once the next one arrives, with a delay equal to the
/// timestamp delta clamped below by `min_delay`.
#[derive(Debug)]
pub struct VariableDelayPacer<T> {
    min_delay: i64,
    origin: Option<i64>,
    position: i64,
    held: Option<(i64, T)>,
}

impl<T> VariableDelayPacer<T> {
    /// `min_delay` is in seconds.
    pub fn new(min_delay: f32) -> Self {
        Self {
            min_delay: (f64::from(min_delay) * NANOS_PER_SEC).round() as i64,
            origin: None,
            position: 0,
            held: None,
        }
    }

    pub fn push(&mut self, timestamp: i64, item: T) -> Result<Option<Paced<T>>, PacingError> {
        let origin = *self.origin.get_or_insert(timestamp);
        let relative = relative_to(origin, timestamp)?;
        let Some((previous, previous_item)) = self.held.take() else {
            self.held = Some((relative, item));
            return Ok(None);
        };
        let delay = relative
            .checked_sub(previous)
            .ok_or(PacingError::TimestampOutOfRange { origin, timestamp })?
            .max(self.min_delay);
        self.held = Some((relative, item));
        Ok(Some(self.release(previous_item, delay)))
    }

    /// Release the last frame with the minimum delay.
    pub fn finish(&mut self) -> Option<Paced<T>> {
        let (_, item) = self.held.take()?;
        Some(self.release(item, self.min_delay))
    }

    fn release(&mut self, item: T, delay: i64) -> Paced<T> {
        let timestamp = self.position;
        self.position = self.position.saturating_add(delay);
        Paced {
            item,
            timestamp,
            duration: delay,
            duplicate: false,
        }
    }
}

/// Audio order check. Samples are never re-timed.
#[derive(Debug, Default)]
pub struct AudioPacer {
    last: Option<i64>,
}

impl AudioPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, timestamp: i64) -> Result<(), PacingError> {
        if let Some(previous) = self.last {
            if timestamp < previous {
                return Err(PacingError::AudioBackwards {
                    previous,
                    current: timestamp,
                });
            }
        }
        self.last = Some(timestamp);
        Ok(())
    }
}

/// Convert a nanosecond duration to GIF delay units (1/100 s), minimum 1.
pub fn gif_delay_units(duration_ns: i64) -> u16 {
    let units = (duration_ns as f64 / 10_000_000.0).round();
    units.clamp(1.0, f64::from(u16::MAX)) as u16
}
