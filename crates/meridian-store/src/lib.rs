// SPDX-License-Identifier: Apache-2.0
//! Repository ports and adapters for the Meridian control plane.
//!
//! Repositories are narrow capability traits per entity — save, lookup,
//! criteria-driven listing, and the bulk variants the pipeline and cascade
//! engine lean on. Criteria are declarative records (filters plus an
//! authorization scope); translating them into backend queries is the
//! adapter's job, so swapping persistence is a wiring change.
//!
//! The in-memory adapters in [`memory`] are the reference implementation:
//! they enforce the same uniqueness, idempotency, and optimistic
//! concurrency rules a database adapter must, and they are what the test
//! suites and the single-node daemon run against.

pub mod criteria;
pub mod memory;
pub mod ports;

pub use criteria::{
    ApprovalCriteria, AuthScope, DriftCriteria, InstanceCriteria, ServiceCriteria,
};
pub use memory::{
    MemoryApprovalRepo, MemoryDriftRepo, MemoryInstanceRepo, MemoryServiceRepo, MemoryShareRepo,
};
pub use ports::{
    ApprovalRepository, BulkOutcome, DriftRepository, InstanceRepository, ServiceRepository,
    ShareRepository,
};
