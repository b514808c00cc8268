// SPDX-License-Identifier: Apache-2.0
//! Resilience primitives for the Meridian control plane.
//!
//! Three small, composable pieces:
//!
//! - [`Deadline`] — a request-scoped absolute expiry, passed explicitly
//!   through call chains and checked *before* every blocking call.
//! - [`RetryPolicy`] — exponential backoff with jitter for
//!   backend-unavailable errors, bounded by the caller's deadline. Nothing
//!   else is ever retried here; CAS conflicts and validation failures
//!   surface immediately.
//! - [`FallbackCache`] — a named, bounded, LRU-evicting, per-entry-TTL
//!   cache of last-known-good read results, consulted only when the
//!   backend stays down.
//!
//! Time is injected through the [`Clock`] port so deadline and TTL logic is
//! testable without sleeping.

mod cache;
mod clock;
mod deadline;
mod retry;

pub use cache::FallbackCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use deadline::{Deadline, DEADLINE_HEADER};
pub use retry::RetryPolicy;
