//! Per-lane stall detection.
//!
//! Progress markers in a worker's output are the only proof of life. A
//! [`StallDetector`] remembers the last count it saw and when that count last
//! grew; once the gap exceeds the inactivity threshold the process is
//! considered stalled. Counts are per process: the detector is restarted
//! whenever a new process is launched.
//!
//! The detector is polled from the coordinator's tick rather than running
//! its own timer task, so it is a plain value with no background state.

use std::time::{Duration, Instant};

use tracing::debug;

/// Progress-based liveness check for one lane.
#[derive(Debug, Clone)]
pub struct StallDetector {
    inactivity_threshold: Duration,
    last_count: usize,
    last_progress: Instant,
}

impl StallDetector {
    /// Construct a detector whose timer starts at `now`.
    #[must_use]
    pub fn new(inactivity_threshold: Duration, now: Instant) -> Self {
        Self {
            inactivity_threshold,
            last_count: 0,
            last_progress: now,
        }
    }

    /// Record `count` observed at `now`.
    ///
    /// Returns `true` while the lane is alive and `false` once `count` has
    /// not grown for at least the inactivity threshold.
    pub fn observe(&mut self, count: usize, now: Instant) -> bool {
        if count > self.last_count {
            self.last_count = count;
            self.last_progress = now;
            return true;
        }

        let idle = now.saturating_duration_since(self.last_progress);
        if idle >= self.inactivity_threshold {
            debug!(idle_secs = idle.as_secs(), count, "no progress within threshold");
            return false;
        }

        true
    }

    /// Begin watching a new process: the timer restarts at `now` and the
    /// count goes back to zero, so the first marker it emits is progress.
    pub fn restart(&mut self, now: Instant) {
        self.last_count = 0;
        self.last_progress = now;
    }

    /// Highest count observed so far.
    #[must_use]
    pub fn last_count(&self) -> usize {
        self.last_count
    }

    /// Time since the count last grew.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_progress)
    }

    /// Configured inactivity threshold.
    #[must_use]
    pub fn inactivity_threshold(&self) -> Duration {
        self.inactivity_threshold
    }
}
