//! Settle — bounded poll-with-backoff while the plugin drains asynchronously.

use std::time::Duration;
use tokio::time::Instant;

use crate::conf::SettleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Reached { elapsed: Duration, polls: u32 },
    TimedOut { elapsed: Duration, polls: u32 },
}

impl Settled {
    pub fn reached(&self) -> bool {
        matches!(self, Settled::Reached { .. })
    }
}

/// Interval doubles from `initial` up to `max`; no poll starts after `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub timeout: Duration,
}

impl Backoff {
    pub fn from_config(config: &SettleConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_interval_ms),
            max: Duration::from_millis(config.max_interval_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Poll `done` until it returns true or the timeout elapses.
    pub async fn until<F>(&self, mut done: F) -> Settled
    where
        F: FnMut() -> bool,
    {
        let started = Instant::now();
        let mut interval = self.initial;
        let mut polls = 0;

        loop {
            polls += 1;
            if done() {
                return Settled::Reached {
                    elapsed: started.elapsed(),
                    polls,
                };
            }
            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Settled::TimedOut { elapsed, polls };
            }
            tokio::time::sleep(interval.min(self.timeout - elapsed)).await;
            interval = (interval * 2).min(self.max);
        }
    }

    /// Poll `count` until it has not changed for `quiet`, or the timeout
    /// elapses. Used when there is no known target count.
    pub async fn until_quiet<F>(&self, quiet: Duration, mut count: F) -> Settled
    where
        F: FnMut() -> usize,
    {
        let mut last = count();
        let mut last_change = Instant::now();

        self.until(|| {
            let now = count();
            if now != last {
                last = now;
                last_change = Instant::now();
                return false;
            }
            last_change.elapsed() >= quiet
        })
        .await
    }
}
