//! Retry policy with exponential backoff and jitter.
//!
//! One policy drives the whole fetch: the attempt budget, a short schedule for
//! ordinary failures and a long, capped schedule once the provider reports
//! throttling.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Exponential delay `base * factor^(attempt - 1)`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the second attempt.
    pub base: Duration,
    /// Multiplier applied for each subsequent attempt.
    pub factor: f64,
    /// Upper bound, applied after jitter.
    pub max: Option<Duration>,
}

impl Backoff {
    /// `2^attempt` seconds, uncapped.
    pub const fn transient() -> Self {
        Self {
            base: Duration::from_secs(2),
            factor: 2.0,
            max: None,
        }
    }

    /// `60 * 2^(attempt - 1)` seconds, capped at 30 minutes.
    pub const fn rate_limited() -> Self {
        Self {
            base: Duration::from_secs(60),
            factor: 2.0,
            max: Some(Duration::from_secs(1_800)),
        }
    }

    /// Delay after the failed `attempt` (1-based) plus `jitter_secs`.
    pub fn delay(self, attempt: u32, jitter_secs: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut seconds = self.base.as_secs_f64() * self.factor.powi(exponent) + jitter_secs;
        if let Some(max) = self.max {
            seconds = seconds.min(max.as_secs_f64());
        }
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Attempt budget and backoff schedules for provider fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Schedule for transport errors, malformed payloads and empty results.
    pub backoff: Backoff,
    /// Schedule once the provider signals throttling.
    pub rate_limit_backoff: Backoff,
    /// Add a uniform `[0, 1)` second offset to every delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::transient(),
            rate_limit_backoff: Backoff::rate_limited(),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Sleep before the attempt following the failed `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32, rate_limited: bool) -> Duration {
        let jitter = if self.jitter { fastrand::f64() } else { 0.0 };
        let schedule = if rate_limited {
            self.rate_limit_backoff
        } else {
            self.backoff
        };
        schedule.delay(attempt, jitter)
    }
}

/// Suspends the fetch between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Real sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        Box::pin(std::future::ready(()))
    }
}
