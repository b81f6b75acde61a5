//! Backoff schedules, jitter sources, and cancellable sleeps shared by the
//! connection manager and the event publisher.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Produces the random component added to a backoff delay.
pub trait JitterSource: Send + Sync + fmt::Debug {
    /// A jitter value in `[0, max)`; zero when `max` is zero.
    fn jitter(&self, max: Duration) -> Duration;
}

/// Uniform jitter with millisecond granularity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn jitter(&self, max: Duration) -> Duration {
        let max_ms = max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

/// Always returns the same jitter, clamped below `max`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub Duration);

impl JitterSource for FixedJitter {
    fn jitter(&self, max: Duration) -> Duration {
        if max.is_zero() {
            Duration::ZERO
        } else {
            self.0.min(max.saturating_sub(Duration::from_nanos(1)))
        }
    }
}

/// Exponential schedule: attempt `k` (1-indexed) waits `base * 2^(k-1)`
/// before attempt `k + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max_jitter: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_jitter: Duration) -> Self {
        Self { base, max_jitter }
    }

    /// Deterministic part of the delay after a failed `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Full delay after a failed `attempt`, including jitter.
    pub fn delay(&self, attempt: u32, jitter: &dyn JitterSource) -> Duration {
        self.base_delay(attempt)
            .saturating_add(jitter.jitter(self.max_jitter))
    }
}

/// Bookkeeping for one pass through a retry loop.
#[derive(Debug)]
pub struct RetryAttempt<E> {
    /// 1-indexed attempt number.
    pub attempt: u32,
    /// Total attempts allowed.
    pub max_attempts: u32,
    /// Error observed on this attempt.
    pub error: E,
}

impl<E> RetryAttempt<E> {
    pub fn has_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `false` when the sleep was cut short by cancellation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
