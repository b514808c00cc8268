// SPDX-License-Identifier: Apache-2.0
//! The repository port traits.
//!
//! Each trait is object-safe and synchronous; async transports sit behind
//! the adapter, not in front of it. Every port owns its entity exclusively
//! — nothing else writes an entity's persisted form.

use chrono::{DateTime, Utc};

use meridian_core::{
    ApplicationService, ApprovalDecision, ApprovalRequest, DriftEvent, EventId, InstanceId, Page,
    PageRequest, PlaneResult, RequestId, ServiceId, ServiceInstance, ServiceShare, ShareId, TeamId,
};

use crate::criteria::{ApprovalCriteria, DriftCriteria, InstanceCriteria, ServiceCriteria};

/// Outcome of a bulk upsert.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BulkOutcome {
    /// Rows that did not exist before.
    pub inserted: usize,
    /// Rows that existed and were rewritten.
    pub modified: usize,
}

/// Persistence port for [`ApplicationService`].
///
/// `save` uses optimistic concurrency: the caller presents the version it
/// read, and the stored row advances to `version + 1`. A mismatch is a
/// `Conflict` with code `VERSION_CONFLICT`.
pub trait ServiceRepository: Send + Sync {
    /// Insert (version 0) or update (matching version) a service.
    fn save(&self, service: ApplicationService) -> PlaneResult<ApplicationService>;

    /// Look up by identity.
    fn find_by_id(&self, id: &ServiceId) -> PlaneResult<Option<ApplicationService>>;

    /// Bulk lookup by display name, for heartbeat batch resolution.
    /// Unknown names are simply absent from the result.
    fn find_by_display_names(&self, names: &[String]) -> PlaneResult<Vec<ApplicationService>>;

    /// Criteria-driven listing.
    fn find_all(
        &self,
        criteria: &ServiceCriteria,
        page: PageRequest,
    ) -> PlaneResult<Page<ApplicationService>>;

    /// Identities of services the principal reaches through the ownership
    /// path: created by `user`, or owned by one of `teams`. Backs the
    /// once-per-request list-scope computation; adapters index this.
    fn find_owned(
        &self,
        user: &meridian_core::UserId,
        teams: &std::collections::BTreeSet<TeamId>,
    ) -> PlaneResult<Vec<ServiceId>>;

    /// Remove a service record. Returns whether it existed.
    fn delete_by_id(&self, id: &ServiceId) -> PlaneResult<bool>;
}

/// Persistence port for [`ServiceInstance`].
///
/// Instance writes are last-writer-wins keyed by `instance_id`, gated by
/// `last_seen_at` monotonicity: an upsert carrying an older `last_seen_at`
/// than the stored row is dropped silently (counted in neither bulk
/// outcome bucket).
pub trait InstanceRepository: Send + Sync {
    /// Insert or overwrite one instance (monotonicity-gated).
    fn save(&self, instance: ServiceInstance) -> PlaneResult<ServiceInstance>;

    /// Look up by identity.
    fn find_by_id(&self, id: &InstanceId) -> PlaneResult<Option<ServiceInstance>>;

    /// Bulk lookup for a heartbeat batch.
    fn find_by_instance_ids(&self, ids: &[InstanceId]) -> PlaneResult<Vec<ServiceInstance>>;

    /// Criteria-driven listing.
    fn find_all(
        &self,
        criteria: &InstanceCriteria,
        page: PageRequest,
    ) -> PlaneResult<Page<ServiceInstance>>;

    /// Remove an instance record. Returns whether it existed.
    fn delete_by_id(&self, id: &InstanceId) -> PlaneResult<bool>;

    /// Upsert a batch, monotonicity-gated per row.
    fn bulk_upsert(&self, instances: Vec<ServiceInstance>) -> PlaneResult<BulkOutcome>;

    /// Rewrite the denormalized team of every instance of a service.
    /// Returns the number of rows touched.
    fn bulk_update_team_id_by_service_id(
        &self,
        service_id: &ServiceId,
        new_team: Option<&TeamId>,
    ) -> PlaneResult<usize>;

    /// Instances whose `last_seen_at` is strictly older than `cutoff` and
    /// whose status is not yet `Unknown` — the staleness sweeper's feed.
    fn find_stale(&self, cutoff: DateTime<Utc>) -> PlaneResult<Vec<ServiceInstance>>;

    /// Purge instances absent since before `cutoff`. Returns the count.
    fn delete_absent_since(&self, cutoff: DateTime<Utc>) -> PlaneResult<usize>;
}

/// Persistence port for [`DriftEvent`].
pub trait DriftRepository: Send + Sync {
    /// Update one event (e.g. acknowledge, add notes). Resolved events
    /// accept only `notes` changes; anything else is a `Conflict`.
    fn save(&self, event: DriftEvent) -> PlaneResult<DriftEvent>;

    /// Look up by identity.
    fn find_by_id(&self, id: &EventId) -> PlaneResult<Option<DriftEvent>>;

    /// Insert freshly detected events, idempotently: an event whose
    /// `{service_name, instance_id, detected_at}` (millisecond precision)
    /// already exists is skipped. Returns the number actually inserted.
    fn insert_detected(&self, events: Vec<DriftEvent>) -> PlaneResult<usize>;

    /// Unresolved events for one instance, oldest first.
    fn find_unresolved(
        &self,
        service_name: &str,
        instance_id: &InstanceId,
    ) -> PlaneResult<Vec<DriftEvent>>;

    /// Resolve every unresolved event for one instance. Returns the count.
    fn resolve_all_for_instance(
        &self,
        service_name: &str,
        instance_id: &InstanceId,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> PlaneResult<usize>;

    /// Criteria-driven listing.
    fn find_all(&self, criteria: &DriftCriteria, page: PageRequest)
        -> PlaneResult<Page<DriftEvent>>;

    /// Rewrite the denormalized team of every event of a service.
    fn bulk_update_team_id_by_service_id(
        &self,
        service_id: &ServiceId,
        new_team: Option<&TeamId>,
    ) -> PlaneResult<usize>;
}

/// Persistence port for [`ServiceShare`].
pub trait ShareRepository: Send + Sync {
    /// Insert a share. Rejects a duplicate of an *active* share with the
    /// same `{service_id, grantee, environments}` with a `Conflict`.
    fn save(&self, share: ServiceShare) -> PlaneResult<ServiceShare>;

    /// Look up by identity.
    fn find_by_id(&self, id: &ShareId) -> PlaneResult<Option<ServiceShare>>;

    /// Every share of one service, expired ones included (audit keeps
    /// them; the evaluator filters).
    fn find_by_service(&self, service_id: &ServiceId) -> PlaneResult<Vec<ServiceShare>>;

    /// Every share in the store. The evaluator uses this to compute list
    /// scopes; adapters back it with an index per grantee.
    fn find_all(&self) -> PlaneResult<Vec<ServiceShare>>;

    /// Revoke a share. Returns whether it existed.
    fn delete_by_id(&self, id: &ShareId) -> PlaneResult<bool>;

    /// Identities of shares expired at `now` — the expiry sweeper's feed.
    fn find_expired(&self, now: DateTime<Utc>) -> PlaneResult<Vec<ShareId>>;
}

/// Persistence port for [`ApprovalRequest`] and its decisions.
pub trait ApprovalRepository: Send + Sync {
    /// Insert a new request, atomically enforcing at most one `Pending`
    /// request per `{requester_user_id, target_service_id}`; a duplicate
    /// is a `Conflict` with code `APPROVAL_DUPLICATE_PENDING`.
    fn insert(&self, request: ApprovalRequest) -> PlaneResult<ApprovalRequest>;

    /// Compare-and-save: persists `request` only when the stored version
    /// equals `expected_version`, advancing to `expected_version + 1`.
    /// A mismatch is a `Conflict` with code `VERSION_CONFLICT`.
    fn compare_and_save(
        &self,
        request: ApprovalRequest,
        expected_version: u64,
    ) -> PlaneResult<ApprovalRequest>;

    /// Look up by identity.
    fn find_by_id(&self, id: &RequestId) -> PlaneResult<Option<ApprovalRequest>>;

    /// Every `Pending` request targeting one service.
    fn find_pending_for_service(&self, service_id: &ServiceId)
        -> PlaneResult<Vec<ApprovalRequest>>;

    /// Criteria-driven listing.
    fn find_all(
        &self,
        criteria: &ApprovalCriteria,
        page: PageRequest,
    ) -> PlaneResult<Page<ApprovalRequest>>;

    /// Record a decision, atomically enforcing one vote per
    /// `{request_id, gate, actor_user_id}`; a second vote is a `Conflict`
    /// with code `APPROVAL_DOUBLE_VOTE`.
    fn add_decision(&self, decision: ApprovalDecision) -> PlaneResult<ApprovalDecision>;

    /// Every decision recorded for a request, oldest first.
    fn decisions_for(&self, request_id: &RequestId) -> PlaneResult<Vec<ApprovalDecision>>;
}
