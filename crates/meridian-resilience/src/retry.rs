// SPDX-License-Identifier: Apache-2.0
//! Bounded retry with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;

use meridian_core::{PlaneError, PlaneResult};

use crate::clock::Clock;
use crate::deadline::Deadline;

/// Retry schedule for backend-unavailable errors.
///
/// Delays double from `initial_delay` up to `max_delay`, with each delay
/// jittered into `[delay/2, delay]` so a fleet of callers does not thunder
/// back in lockstep. The schedule is additionally bounded by the caller's
/// [`Deadline`]: a sleep never runs past it, and the loop fails fast with
/// `DeadlineExceeded` once the budget is gone.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the backoff schedule.
    pub max_delay: Duration,
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Whether to jitter delays. Disabled only in tests.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            max_attempts: 4,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// The backoff delay before retry number `retry` (zero-based), jittered.
    #[must_use]
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exp = retry.min(20);
        let raw = self
            .initial_delay
            .saturating_mul(2_u32.saturating_pow(exp))
            .min(self.max_delay);
        if !self.jitter || raw.is_zero() {
            return raw;
        }
        let raw_ms = u64::try_from(raw.as_millis()).unwrap_or(u64::MAX);
        let low = (raw_ms / 2).max(1);
        Duration::from_millis(rand::thread_rng().gen_range(low..=raw_ms))
    }

    /// Run `call` with retries.
    ///
    /// Only `BackendUnavailable` errors are retried; every other category
    /// surfaces immediately. Before each attempt (and each sleep) the
    /// deadline is checked, so a dead backend costs the caller its budget
    /// at most once.
    ///
    /// # Errors
    ///
    /// The last `BackendUnavailable` error once attempts are exhausted,
    /// `DeadlineExceeded` when the budget runs out mid-schedule, or the
    /// first non-retryable error from `call`.
    pub fn run<T>(
        &self,
        clock: &dyn Clock,
        deadline: Deadline,
        op: &'static str,
        mut call: impl FnMut() -> PlaneResult<T>,
    ) -> PlaneResult<T> {
        let attempts = self.max_attempts.max(1);
        let mut last_err: Option<PlaneError> = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.delay_before_retry(attempt - 1);
                if !deadline.has_time_remaining(clock.now(), delay) {
                    return Err(PlaneError::deadline_exceeded(
                        op,
                        "deadline would elapse during backoff",
                    ));
                }
                std::thread::sleep(delay);
            }
            deadline.check(clock.now(), Duration::ZERO, op)?;
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.kind().is_retryable() => last_err = Some(err),
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| PlaneError::backend_unavailable(op, "retries exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_attempts: 3,
            jitter: false,
        }
    }

    fn far_deadline() -> Deadline {
        Deadline::after(Instant::now(), Duration::from_secs(5))
    }

    #[test]
    fn retries_backend_unavailable_until_success() {
        let mut calls = 0;
        let result = policy().run(&SystemClock, far_deadline(), "op", || {
            calls += 1;
            if calls < 3 {
                Err(PlaneError::backend_unavailable("op", "down"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_retryable_errors_surface_immediately() {
        let mut calls = 0;
        let result: PlaneResult<()> = policy().run(&SystemClock, far_deadline(), "op", || {
            calls += 1;
            Err(PlaneError::conflict(meridian_core::codes::KV_CAS_CONFLICT, "op", "cas"))
        });
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().code(), meridian_core::codes::KV_CAS_CONFLICT);
    }

    #[test]
    fn exhausted_retries_return_last_error() {
        let result: PlaneResult<()> = policy().run(&SystemClock, far_deadline(), "op", || {
            Err(PlaneError::backend_unavailable("op", "still down"))
        });
        assert_eq!(
            result.unwrap_err().kind(),
            meridian_core::ErrorKind::BackendUnavailable
        );
    }

    #[test]
    fn expired_deadline_fails_fast() {
        let now = Instant::now();
        let expired = Deadline::after(now, Duration::ZERO);
        let mut calls = 0;
        let result: PlaneResult<()> = RetryPolicy { max_attempts: 3, ..policy() }.run(
            &SystemClock,
            expired,
            "op",
            || {
                calls += 1;
                Err(PlaneError::backend_unavailable("op", "down"))
            },
        );
        assert_eq!(result.unwrap_err().kind(), meridian_core::ErrorKind::DeadlineExceeded);
        assert!(calls <= 1);
    }

    #[test]
    fn backoff_doubles_to_the_ceiling() {
        let p = policy();
        assert_eq!(p.delay_before_retry(0), Duration::from_millis(1));
        assert_eq!(p.delay_before_retry(1), Duration::from_millis(2));
        assert_eq!(p.delay_before_retry(5), Duration::from_millis(2));
    }
}
