// SPDX-License-Identifier: Apache-2.0
//! Ownership-transfer approvals: state machine, evaluator, and cascade.
//!
//! A request moves `Pending → {Approved, Rejected, Cancelled}` and never
//! back. After every recorded decision the evaluator runs: any REJECT ends
//! the request immediately (first reject wins, whatever its gate), and
//! once every gate has reached its approval threshold the request is
//! approved and the cascade engine rewrites the world:
//!
//! 1. the service's owner team,
//! 2. the denormalized team on every instance of the service,
//! 3. the denormalized team on every drift event of the service,
//! 4. every *other* pending request for the service — same target team is
//!    approved along, any other target is rejected.
//!
//! Every transition is an optimistic compare-and-save on the request
//! version, retried up to the configured bound before surfacing
//! `Conflict`.

mod engine;

pub use engine::{ApprovalEngine, CreateApproval};
