// SPDX-License-Identifier: Apache-2.0
//! Request-scoped deadlines.

use std::time::{Duration, Instant};

use meridian_core::{PlaneError, PlaneResult};

/// HTTP header carrying the remaining deadline budget in milliseconds.
///
/// Outbound adapters stamp this on every downstream call so the whole call
/// tree shares one absolute expiry instead of stacking fresh timeouts.
pub const DEADLINE_HEADER: &str = "x-deadline-ms";

/// An absolute expiry for one inbound operation.
///
/// A `Deadline` is a plain value passed explicitly through call chains —
/// never process-wide state. Callers check it *before* each blocking call
/// and fail fast with `DeadlineExceeded` instead of starting I/O they
/// cannot finish.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// A deadline expiring `budget` after `now`.
    #[must_use]
    pub fn after(now: Instant, budget: Duration) -> Self {
        Self { expires_at: now + budget }
    }

    /// A deadline at an absolute instant.
    #[must_use]
    pub fn at(expires_at: Instant) -> Self {
        Self { expires_at }
    }

    /// The absolute expiry instant.
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Budget left at `now`; zero once expired.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Whether at least `min_budget` is left at `now`.
    #[must_use]
    pub fn has_time_remaining(&self, now: Instant, min_budget: Duration) -> bool {
        self.remaining(now) >= min_budget
    }

    /// Fail fast when the deadline has passed or less than `min_budget` is
    /// left. An already-expired deadline fails even with a zero budget.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` naming `op` when the budget is gone.
    pub fn check(&self, now: Instant, min_budget: Duration, op: &'static str) -> PlaneResult<()> {
        let remaining = self.remaining(now);
        if remaining.is_zero() || remaining < min_budget {
            return Err(PlaneError::deadline_exceeded(
                op,
                "deadline reached before the call started",
            ));
        }
        Ok(())
    }

    /// The remaining budget at `now` as a millisecond header value.
    ///
    /// Millisecond precision is the propagation contract; sub-millisecond
    /// remainders round down, and an expired deadline propagates as `0`.
    #[must_use]
    pub fn header_value(&self, now: Instant) -> String {
        self.remaining(now).as_millis().to_string()
    }

    /// Parse an inbound header value back into a deadline relative to `now`.
    #[must_use]
    pub fn from_header_value(raw: &str, now: Instant) -> Option<Self> {
        let ms: u64 = raw.trim().parse().ok()?;
        Some(Self::after(now, Duration::from_millis(ms)))
    }
}
