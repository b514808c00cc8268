// SPDX-License-Identifier: Apache-2.0
//! In-memory reference adapters.
//!
//! Each adapter is a `RwLock`-guarded map enforcing exactly the rules the
//! port documents: optimistic versioning, monotonic instance upserts,
//! millisecond drift dedup, active-duplicate share rejection, and the
//! unique-pending approval constraint. A database adapter must match this
//! behavior bit for bit; the shared test suites run against these.

mod approvals;
mod drift;
mod instances;
mod services;
mod shares;

pub use approvals::MemoryApprovalRepo;
pub use drift::MemoryDriftRepo;
pub use instances::MemoryInstanceRepo;
pub use services::MemoryServiceRepo;
pub use shares::MemoryShareRepo;

use meridian_core::{PlaneError, SortDir};

/// Map a poisoned lock to the shared backend-unavailable error.
pub(crate) fn poisoned(op: &'static str) -> PlaneError {
    PlaneError::backend_unavailable(op, "store lock poisoned")
}

/// Apply a direction to an ordering.
pub(crate) fn directed(ordering: std::cmp::Ordering, dir: SortDir) -> std::cmp::Ordering {
    match dir {
        SortDir::Asc => ordering,
        SortDir::Desc => ordering.reverse(),
    }
}
