//! Heartbeat timer for an open session.
//!
//! A [`Heartbeat`] is created when a session opens and dropped when it ends,
//! so no tick can outlive the `Open` state. The first tick fires one full
//! interval after the session opened.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Default interval between pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration =
    Duration::from_millis(crate::config::DEFAULT_HEARTBEAT_INTERVAL_MS);

/// Periodic ping schedule.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Interval,
    sent: u64,
}

impl Heartbeat {
    pub fn start(period: Duration) -> Self {
        // `interval_at` panics on a zero period.
        let period = period.max(Duration::from_millis(1));
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, sent: 0 }
    }

    /// Wait for the next ping slot.
    pub async fn tick(&mut self) {
        let _ = self.interval.tick().await;
        self.sent += 1;
    }

    /// Ticks elapsed since the session opened.
    pub fn ticks(&self) -> u64 {
        self.sent
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}
