// SPDX-License-Identifier: Apache-2.0
//! The time port: monotonic and wall clocks behind one trait.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Source of time for deadlines, TTLs, and sweepers.
///
/// Production code uses [`SystemClock`]; tests drive [`ManualClock`] so
/// expiry logic can be exercised without sleeping.
pub trait Clock: Send + Sync {
    /// Monotonic instant, for deadlines and TTL arithmetic.
    fn now(&self) -> Instant;
    /// Wall-clock instant, for persisted timestamps.
    fn wall_now(&self) -> DateTime<Utc>;
}

/// The real clocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A hand-cranked clock for tests.
///
/// Starts at a fixed origin and only moves when [`advance`](Self::advance)
/// is called.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(Instant, DateTime<Utc>)>,
}

impl ManualClock {
    /// A clock frozen at construction time.
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new((Instant::now(), Utc::now())) }
    }

    /// Move both clocks forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.0 += delta;
            if let Ok(chrono_delta) = chrono::Duration::from_std(delta) {
                state.1 += chrono_delta;
            }
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().map_or_else(|e| e.into_inner().0, |s| s.0)
    }

    fn wall_now(&self) -> DateTime<Utc> {
        self.state.lock().map_or_else(|e| e.into_inner().1, |s| s.1)
    }
}
