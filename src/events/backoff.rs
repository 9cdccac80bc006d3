// Reconnect delay: exponential from `min`, capped at `max`, with random jitter.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    /// Fraction of the current base delay used as the jitter window (0.0 - 1.0).
    jitter: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, jitter: f64) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            current: min,
        }
    }

    /// Delay before the next attempt; doubles the base for the attempt after.
    /// Always within [min, max].
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.as_millis() as u64;
        let span = (base as f64 * self.jitter) as u64;
        let max = self.max.as_millis() as u64;
        let min = self.min.as_millis() as u64;

        // The window slides down below the cap so jitter survives once `base` reaches `max`.
        let hi = base.saturating_add(span).min(max);
        let lo = hi.saturating_sub(span).max(min).min(hi);
        let delay = if lo < hi {
            rand::rng().random_range(lo..=hi)
        } else {
            hi
        };

        self.current = self.current.saturating_mul(2).min(self.max);
        Duration::from_millis(delay)
    }

    /// Back to `min` after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.min;
    }

    pub fn current_base(&self) -> Duration {
        self.current
    }
}
