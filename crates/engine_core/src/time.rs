//! Frame timing for the host loop.

use std::time::{Duration, Instant};

/// Default simulation rate.
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Tracks wall-clock frame deltas and paces a fixed-rate loop.
#[derive(Debug)]
pub struct FrameClock {
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
    frame_interval: Duration,
    /// Wall time not yet consumed by [`FrameClock::take_frame`].
    accumulator: Duration,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE)
    }
}

impl FrameClock {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            last_frame: Instant::now(),
            delta: Duration::ZERO,
            frame_count: 0,
            frame_interval: Duration::from_secs_f64(1.0 / rate_hz),
            accumulator: Duration::ZERO,
        }
    }

    /// Sample the wall clock at the start of a loop iteration.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_frame;
        self.last_frame = now;
        self.accumulator += self.delta;
    }

    /// Consume one frame interval if enough wall time has passed.
    pub fn take_frame(&mut self) -> bool {
        if self.accumulator >= self.frame_interval {
            self.accumulator -= self.frame_interval;
            self.frame_count += 1;
            true
        } else {
            false
        }
    }

    /// Time left until the next frame is due.
    pub fn until_next_frame(&self) -> Duration {
        self.frame_interval.saturating_sub(self.accumulator)
    }

    pub fn frame_seconds(&self) -> f32 {
        self.frame_interval.as_secs_f32()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
