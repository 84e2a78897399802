//! Fixed-period ticker
//!
//! Wraps a tokio interval so periodic work (agent heartbeats, discovery
//! announcements) is driven from one place. Under
//! `#[tokio::test(start_paused = true)]` the ticker runs on virtual time.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Periodic tick source with a running tick count
pub struct Ticker {
    interval: Interval,
    ticks: u64,
}

impl Ticker {
    /// Ticker whose first tick completes immediately
    pub fn new(period: Duration) -> Self {
        // tokio rejects a zero period
        let period = period.max(Duration::from_millis(1));
        let mut interval = time::interval_at(Instant::now(), period);
        // A stalled handler shifts the schedule instead of bursting
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, ticks: 0 }
    }

    /// Wait for the next tick and return its 1-based sequence number
    pub async fn tick(&mut self) -> u64 {
        self.interval.tick().await;
        self.ticks += 1;
        self.ticks
    }

    /// Ticks delivered so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_immediate() {
        let start = Instant::now();
        let mut ticker = Ticker::new(Duration::from_secs(5));

        assert_eq!(ticker.tick().await, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_period_in_virtual_time() {
        let start = Instant::now();
        let mut ticker = Ticker::new(Duration::from_secs(5));

        ticker.tick().await;
        ticker.tick().await;
        ticker.tick().await;

        assert_eq!(ticker.ticks(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
