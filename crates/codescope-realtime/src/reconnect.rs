//! Reconnection backoff and attempt accounting.
//!
//! The delay before attempt `n` (1-indexed) is `base * 2^(n-1)`. There is no
//! jitter and no cap other than the attempt ceiling.

use std::time::Duration;

/// Backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry; doubles on each further failure.
    pub base_delay: Duration,
    /// Failed attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(crate::config::DEFAULT_BASE_DELAY_MS),
            max_attempts: crate::config::DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before attempt `attempt` (1-indexed). Saturates instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exp).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// What to do after a connection closed or failed to open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectStep {
    /// Sleep `delay`, then make attempt number `attempt`.
    Retry { attempt: u32, delay: Duration },
    /// The ceiling was reached. Returned exactly once.
    Exhausted { attempts: u32 },
    /// Already exhausted; nothing more to do.
    Halted,
}

/// Attempt counter driven by the connection loop.
#[derive(Debug)]
pub struct Reconnector {
    policy: BackoffPolicy,
    attempts: u32,
    exhausted: bool,
}

impl Reconnector {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            exhausted: false,
        }
    }

    /// A connection opened: the next failure starts over at the base delay.
    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// Decide the next step after a close or a failed attempt.
    pub fn next_step(&mut self) -> ReconnectStep {
        if self.exhausted {
            return ReconnectStep::Halted;
        }
        if self.attempts >= self.policy.max_attempts {
            self.exhausted = true;
            return ReconnectStep::Exhausted {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        ReconnectStep::Retry {
            attempt: self.attempts,
            delay: self.policy.delay(self.attempts),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }
}
