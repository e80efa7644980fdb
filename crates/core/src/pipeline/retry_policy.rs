use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::shared::constants::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Doubles after every failure, never exceeding `max_delay`.
    Exponential { max_delay: Duration },
}

/// How often and how patiently an input stream is (re)opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectRetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    backoff: Backoff,
}

impl ConnectRetryPolicy {
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff: Backoff::Exponential {
                max_delay: max_delay.max(base_delay),
            },
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential { max_delay } => {
                let shift = attempt.saturating_sub(1).min(16) as u32;
                self.base_delay
                    .saturating_mul(1u32 << shift)
                    .min(max_delay)
            }
        }
    }
}

impl Default for ConnectRetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)
    }
}

/// Sleeps for `duration` unless `stop` is raised first. Returns `false` when
/// interrupted.
pub fn sleep_unless(stop: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
