// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]
//! Behavior the in-memory adapters must share with any database adapter:
//! versioning, monotonic upserts, dedup, uniqueness, and stable paging.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};

use meridian_core::{
    codes, ApplicationService, ApprovalDecision, ApprovalGate, ApprovalRequest, DecisionKind,
    DriftEvent, DriftSeverity, DriftStatus, EventId, Grantee, GranteeType, InstanceId,
    InstanceStatus, PageRequest, Permission, ResourceLevel, ServiceId, ServiceInstance,
    ServiceShare, ShareId, SortDir, SortKey, TeamId, UserId,
};
use meridian_store::{
    ApprovalRepository, DriftRepository, InstanceRepository, MemoryApprovalRepo, MemoryDriftRepo,
    MemoryInstanceRepo, MemoryServiceRepo, MemoryShareRepo, ServiceCriteria, ServiceRepository,
    ShareRepository,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

fn service(id: &str, updated_secs: i64) -> ApplicationService {
    let mut svc = ApplicationService::new(
        ServiceId::parse(id).unwrap(),
        format!("Service {id}"),
        ["prod".to_owned()],
        UserId::parse("alice").unwrap(),
        at(0),
    )
    .unwrap();
    svc.updated_at = at(updated_secs);
    svc
}

fn instance(id: &str, service: &str, seen_secs: i64) -> ServiceInstance {
    ServiceInstance {
        instance_id: InstanceId::parse(id).unwrap(),
        service_id: ServiceId::parse(service).unwrap(),
        service_name: service.to_owned(),
        team_id: None,
        host: None,
        port: None,
        environment: Some("prod".into()),
        version: None,
        expected_hash: None,
        config_hash: None,
        last_applied_hash: None,
        status: InstanceStatus::Healthy,
        last_seen_at: at(seen_secs),
        has_drift: false,
        drift_detected_at: None,
        created_at: at(0),
        updated_at: at(seen_secs),
    }
}

fn drift_event(service: &str, instance: &str, detected_secs: i64) -> DriftEvent {
    DriftEvent {
        id: EventId::generate(),
        service_id: ServiceId::parse(service).unwrap(),
        service_name: service.to_owned(),
        instance_id: InstanceId::parse(instance).unwrap(),
        environment: Some("prod".into()),
        expected_hash: "aaa".into(),
        applied_hash: "bbb".into(),
        severity: DriftSeverity::Critical,
        status: DriftStatus::Detected,
        detected_at: at(detected_secs),
        resolved_at: None,
        detected_by: "system".into(),
        resolved_by: None,
        team_id: None,
        notes: None,
        updated_at: at(detected_secs),
    }
}

fn share(service: &str, grantee: &str, envs: &[&str]) -> ServiceShare {
    ServiceShare {
        id: ShareId::generate(),
        resource_level: ResourceLevel::Service,
        service_id: ServiceId::parse(service).unwrap(),
        instance_id: None,
        grantee: Grantee { kind: GranteeType::Team, id: grantee.to_owned() },
        permissions: [Permission::ViewService].into_iter().collect(),
        environments: envs.iter().map(|env| (*env).to_owned()).collect(),
        expires_at: None,
        created_at: at(0),
        created_by: UserId::parse("alice").unwrap(),
    }
}

fn request(service: &str, team: &str, requester: &str) -> ApprovalRequest {
    ApprovalRequest::new(
        ServiceId::parse(service).unwrap(),
        TeamId::parse(team).unwrap(),
        UserId::parse(requester).unwrap(),
        None,
        vec![ApprovalGate { name: "owners".into(), min_approvals: 1 }],
        None,
        at(0),
    )
    .unwrap()
}

#[test]
fn service_save_enforces_optimistic_versions() {
    let repo = MemoryServiceRepo::new();
    let saved = repo.save(service("svc-a", 0)).unwrap();
    assert_eq!(saved.version, 1);

    // Writing from a stale snapshot loses.
    let stale = service("svc-a", 1);
    let err = repo.save(stale).unwrap_err();
    assert_eq!(err.code(), codes::VERSION_CONFLICT);

    // Writing from the current snapshot wins and bumps again.
    let mut current = repo.find_by_id(&saved.id).unwrap().unwrap();
    current.display_name = "renamed".into();
    assert_eq!(repo.save(current).unwrap().version, 2);
}

#[test]
fn service_paging_is_stable_under_timestamp_ties() {
    let repo = MemoryServiceRepo::new();
    // Same updated_at for all three: the id tie-break decides.
    for id in ["svc-c", "svc-a", "svc-b"] {
        repo.save(service(id, 100)).unwrap();
    }
    let page = repo
        .find_all(&ServiceCriteria::default(), PageRequest::first(2))
        .unwrap();
    let ids: Vec<&str> = page.content.iter().map(|svc| svc.id.as_str()).collect();
    assert_eq!(ids, ["svc-a", "svc-b"]);
    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 2);

    let rest = repo
        .find_all(&ServiceCriteria::default(), PageRequest::at(1, 2))
        .unwrap();
    let ids: Vec<&str> = rest.content.iter().map(|svc| svc.id.as_str()).collect();
    assert_eq!(ids, ["svc-c"]);
}

#[test]
fn service_sort_override_by_id_desc() {
    let repo = MemoryServiceRepo::new();
    for (id, secs) in [("svc-a", 3), ("svc-b", 2), ("svc-c", 1)] {
        repo.save(service(id, secs)).unwrap();
    }
    let page = repo
        .find_all(
            &ServiceCriteria::default(),
            PageRequest::first(10).sorted_by(SortKey::Id, SortDir::Desc),
        )
        .unwrap();
    let ids: Vec<&str> = page.content.iter().map(|svc| svc.id.as_str()).collect();
    assert_eq!(ids, ["svc-c", "svc-b", "svc-a"]);
}

#[test]
fn instance_bulk_upsert_gates_on_monotonic_last_seen() {
    let repo = MemoryInstanceRepo::new();
    let outcome = repo
        .bulk_upsert(vec![instance("i-1", "svc-a", 100), instance("i-2", "svc-a", 100)])
        .unwrap();
    assert_eq!((outcome.inserted, outcome.modified), (2, 0));

    // A newer and an older write for i-1: only the newer lands.
    let outcome = repo
        .bulk_upsert(vec![instance("i-1", "svc-a", 200), instance("i-2", "svc-a", 50)])
        .unwrap();
    assert_eq!((outcome.inserted, outcome.modified), (0, 1));
    let i1 = repo.find_by_id(&InstanceId::parse("i-1").unwrap()).unwrap().unwrap();
    assert_eq!(i1.last_seen_at, at(200));
    let i2 = repo.find_by_id(&InstanceId::parse("i-2").unwrap()).unwrap().unwrap();
    assert_eq!(i2.last_seen_at, at(100));
}

#[test]
fn instance_team_rewrite_and_stale_scan() {
    let repo = MemoryInstanceRepo::new();
    repo.bulk_upsert(vec![
        instance("i-1", "svc-a", 100),
        instance("i-2", "svc-a", 100),
        instance("i-3", "svc-b", 100),
    ])
    .unwrap();
    let team = TeamId::parse("t-new").unwrap();
    let touched = repo
        .bulk_update_team_id_by_service_id(&ServiceId::parse("svc-a").unwrap(), Some(&team))
        .unwrap();
    assert_eq!(touched, 2);

    let stale = repo.find_stale(at(100)).unwrap();
    assert!(stale.is_empty());
    let stale = repo.find_stale(at(101)).unwrap();
    assert_eq!(stale.len(), 3);

    assert_eq!(repo.delete_absent_since(at(101)).unwrap(), 3);
}

#[test]
fn drift_insert_is_idempotent_by_millisecond_key() {
    let repo = MemoryDriftRepo::new();
    let event = drift_event("svc-a", "i-1", 100);
    let mut duplicate = drift_event("svc-a", "i-1", 100);
    duplicate.id = EventId::generate();
    assert_eq!(repo.insert_detected(vec![event, duplicate]).unwrap(), 1);

    // Re-delivery of the same detection inserts nothing.
    assert_eq!(repo.insert_detected(vec![drift_event("svc-a", "i-1", 100)]).unwrap(), 0);
    // A later detection is a new event.
    assert_eq!(repo.insert_detected(vec![drift_event("svc-a", "i-1", 101)]).unwrap(), 1);
}

#[test]
fn drift_resolution_freezes_everything_but_notes() {
    let repo = MemoryDriftRepo::new();
    let event = drift_event("svc-a", "i-1", 100);
    repo.insert_detected(vec![event.clone()]).unwrap();

    let resolved = repo
        .resolve_all_for_instance("svc-a", &InstanceId::parse("i-1").unwrap(), "system", at(200))
        .unwrap();
    assert_eq!(resolved, 1);

    let mut stored = repo.find_by_id(&event.id).unwrap().unwrap();
    assert_eq!(stored.status, DriftStatus::Resolved);
    assert_eq!(stored.resolved_by.as_deref(), Some("system"));

    // Notes stay writable.
    stored.notes = Some("post-mortem link".into());
    stored.updated_at = at(300);
    assert!(repo.save(stored.clone()).is_ok());

    // Anything else is frozen.
    stored.applied_hash = "ccc".into();
    let err = repo.save(stored).unwrap_err();
    assert_eq!(err.code(), codes::LIFECYCLE_CONFLICT);
}

#[test]
fn share_active_duplicates_are_rejected() {
    let repo = MemoryShareRepo::new();
    repo.save(share("svc-a", "team-b", &["prod"])).unwrap();

    let err = repo.save(share("svc-a", "team-b", &["prod"])).unwrap_err();
    assert_eq!(err.code(), codes::LIFECYCLE_CONFLICT);

    // A different environment filter is a different grant.
    repo.save(share("svc-a", "team-b", &["dev"])).unwrap();
    // An expired duplicate may coexist (kept for audit).
    let mut expired = share("svc-a", "team-b", &["prod"]);
    expired.expires_at = Some(at(0) - Duration::seconds(10));
    expired.created_at = at(0);
    repo.save(expired).unwrap();

    assert_eq!(
        repo.find_by_service(&ServiceId::parse("svc-a").unwrap()).unwrap().len(),
        3
    );
    assert_eq!(repo.find_expired(at(0)).unwrap().len(), 1);
}

#[test]
fn approval_unique_pending_and_double_vote_guards() {
    let repo = MemoryApprovalRepo::new();
    let stored = repo.insert(request("svc-x", "t1", "alice")).unwrap();
    assert_eq!(stored.version, 1);

    let err = repo.insert(request("svc-x", "t2", "alice")).unwrap_err();
    assert_eq!(err.code(), codes::APPROVAL_DUPLICATE_PENDING);
    // Same user, different service is fine.
    repo.insert(request("svc-y", "t1", "alice")).unwrap();
    // Different user, same service is fine.
    repo.insert(request("svc-x", "t1", "bob")).unwrap();

    let decision = ApprovalDecision {
        id: uuid::Uuid::new_v4(),
        request_id: stored.id,
        gate: "owners".into(),
        decision: DecisionKind::Approve,
        actor_user_id: UserId::parse("carol").unwrap(),
        actor_team_id: None,
        note: None,
        created_at: at(10),
    };
    repo.add_decision(decision.clone()).unwrap();
    let err = repo
        .add_decision(ApprovalDecision { id: uuid::Uuid::new_v4(), ..decision })
        .unwrap_err();
    assert_eq!(err.code(), codes::APPROVAL_DOUBLE_VOTE);
}

#[test]
fn approval_compare_and_save_detects_races() {
    let repo = MemoryApprovalRepo::new();
    let stored = repo.insert(request("svc-x", "t1", "alice")).unwrap();

    let mut first = stored.clone();
    first.note = Some("first writer".into());
    let first = repo.compare_and_save(first, stored.version).unwrap();
    assert_eq!(first.version, 2);

    let mut second = stored;
    second.note = Some("second writer".into());
    let err = repo.compare_and_save(second.clone(), second.version).unwrap_err();
    assert_eq!(err.code(), codes::VERSION_CONFLICT);
}

#[test]
fn scope_filters_listings() {
    let repo = MemoryServiceRepo::new();
    for id in ["svc-a", "svc-b"] {
        repo.save(service(id, 0)).unwrap();
    }
    let scope: BTreeSet<ServiceId> = [ServiceId::parse("svc-a").unwrap()].into_iter().collect();
    let criteria = ServiceCriteria {
        scope: meridian_store::AuthScope::ServiceIds(scope),
        ..ServiceCriteria::default()
    };
    let page = repo.find_all(&criteria, PageRequest::first(10)).unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].id.as_str(), "svc-a");
}
