//! Retry schedule for failed persistence flushes.

use std::time::Duration;

use crate::domain::Timestamp;

/// Exponential backoff keyed on the crawler clock.
///
/// The first failure waits `baseline`; each further consecutive failure
/// doubles the wait up to `max`. A success resets to `baseline`.
#[derive(Debug, Clone)]
pub struct FlushBackoff {
    baseline: Duration,
    max: Duration,
    delay: Duration,
    next_attempt: Option<Timestamp>,
    failures: u32,
}

impl FlushBackoff {
    /// Schedule starting at `baseline`, capped at `max`.
    pub fn new(baseline: Duration, max: Duration) -> Self {
        Self {
            baseline,
            max: max.max(baseline),
            delay: baseline,
            next_attempt: None,
            failures: 0,
        }
    }

    /// True when a flush may be attempted at `now`.
    pub fn is_ready(&self, now: Timestamp) -> bool {
        self.next_attempt.map_or(true, |at| now >= at)
    }

    /// Earliest time of the next attempt, if one is being delayed.
    pub fn next_attempt(&self) -> Option<Timestamp> {
        self.next_attempt
    }

    /// Delay the next failure will impose.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Consecutive failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Register a failure at `now`; returns the wait before the next attempt.
    pub fn record_failure(&mut self, now: Timestamp) -> Duration {
        let wait = self.delay;
        self.next_attempt = Some(now.saturating_add(wait));
        self.delay = self.delay.saturating_mul(2).min(self.max);
        self.failures = self.failures.saturating_add(1);
        wait
    }

    /// Register a success.
    pub fn record_success(&mut self) {
        self.delay = self.baseline;
        self.next_attempt = None;
        self.failures = 0;
    }
}
