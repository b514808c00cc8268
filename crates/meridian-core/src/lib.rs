// SPDX-License-Identifier: Apache-2.0
//! Domain model for the Meridian configuration control plane.
//!
//! `meridian-core` is a leaf crate: identifiers, entities, the permission
//! model, the shared error taxonomy, and the paging contract. It holds no
//! I/O and no policy — repositories, evaluators, and pipelines live in the
//! crates layered above.
//!
//! # Ownership Discipline
//!
//! Entities reference each other by ID only; there are no object-graph
//! cycles. Repositories (in `meridian-store`) exclusively own persisted
//! entities. A [`DriftEvent`] carries `service_id` and `team_id` as
//! back-references, never as ownership.

mod approval;
mod drift;
mod error;
mod heartbeat;
mod ident;
mod instance;
mod page;
mod permission;
mod service;
mod share;

pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalRequest, ApprovalStatus, DecisionKind,
};
pub use drift::{DriftEvent, DriftSeverity, DriftStatus};
pub use error::{codes, ErrorKind, PlaneError, PlaneResult};
pub use heartbeat::Heartbeat;
pub use ident::{EventId, InstanceId, RequestId, ServiceId, ShareId, TeamId, UserId};
pub use instance::{drift_between, InstanceStatus, ServiceInstance};
pub use page::{Page, PageRequest, SortDir, SortKey};
pub use permission::{Actor, Permission, Role, OWNER_BUNDLE, SHAREABLE_PERMISSIONS};
pub use service::{ApplicationService, ServiceLifecycle};
pub use share::{Grantee, GranteeType, ResourceLevel, ServiceShare};
