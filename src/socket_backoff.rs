//! Linear-with-jitter reconnect schedule.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectPolicy;

/// One scheduled reconnect: which attempt it is and how long to wait first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    pub attempt: u32,
    pub delay: Duration,
}

/// Attempt counter for consecutive failed connections.
///
/// Starts at 1, grows by one per failure up to the policy cap, and returns to
/// 1 once a connection delivers a message.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// An inverted jitter window is reordered and a zero cap is raised to 1.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        let policy = ReconnectPolicy {
            jitter_min_ms: policy.jitter_min_ms.min(policy.jitter_max_ms),
            jitter_max_ms: policy.jitter_min_ms.max(policy.jitter_max_ms),
            max_attempt: policy.max_attempt.max(1),
        };
        Self { policy, attempt: 1 }
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&mut self) -> ReconnectAttempt {
        self.next_delay_with(&mut rand::rng())
    }

    /// `base * attempt`, with `base` uniform over the jitter window.
    pub fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ReconnectAttempt {
        let base = rng.random_range(self.policy.jitter_min_ms..=self.policy.jitter_max_ms);
        let scheduled = ReconnectAttempt {
            attempt: self.attempt,
            delay: Duration::from_millis(base.saturating_mul(u64::from(self.attempt))),
        };
        self.attempt = (self.attempt + 1).min(self.policy.max_attempt);
        scheduled
    }

    pub fn reset(&mut self) {
        self.attempt = 1;
    }
}

#[cfg(test)]
#[path = "socket_backoff_test.rs"]
mod tests;
