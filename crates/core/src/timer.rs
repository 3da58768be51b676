//! Frame timing.

use std::time::{Duration, Instant};

/// Upper bound on a single frame delta.
///
/// A window that was minimized or dragged can stall the loop for seconds;
/// feeding that straight into the particle integrator makes every particle
/// jump at once.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Monotonic clock driving the frame loop.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    frame_count: u64,
}

impl Timer {
    /// Start a new timer at the current instant.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frame_count: 0,
        }
    }

    /// Time since the timer was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// [`elapsed`](Self::elapsed) in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Advance one frame and return the clamped delta since the previous tick.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frame_count += 1;
        delta.min(MAX_FRAME_DELTA)
    }

    /// [`tick`](Self::tick) in seconds.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Number of ticks since creation or the last reset.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// A per-call seed in `[0, 100000)` taken from the monotonic clock.
    ///
    /// Consecutive frames land on unrelated values, which is all the
    /// particle shader needs to decorrelate its noise between dispatches.
    pub fn monotonic_seed(&self) -> f32 {
        (self.start.elapsed().as_nanos() % 100_000) as f32
    }

    /// Restart the timer from the current instant.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.frame_count = 0;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 2);
        timer.reset();
        assert_eq!(timer.frame_count(), 0);
    }

    #[test]
    fn test_tick_is_clamped() {
        let mut timer = Timer::new();
        let Some(past) = Instant::now().checked_sub(Duration::from_secs(5)) else {
            return;
        };
        timer.last_tick = past;
        assert_eq!(timer.tick(), MAX_FRAME_DELTA);
    }

    #[test]
    fn test_monotonic_seed_range() {
        let timer = Timer::new();
        for _ in 0..16 {
            let seed = timer.monotonic_seed();
            assert!((0.0..100_000.0).contains(&seed));
        }
    }
}
