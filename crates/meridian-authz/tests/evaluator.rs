// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]
//! Decision-rule ordering, share filters, list scoping, and the
//! monotonicity property: shares only ever widen access.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use meridian_authz::{AccessRequest, AuthzEvaluator};
use meridian_core::{
    Actor, ApplicationService, ErrorKind, Grantee, GranteeType, InstanceId, Permission,
    ResourceLevel, Role, ServiceId, ServiceShare, ShareId, TeamId, UserId,
};
use meridian_resilience::SystemClock;
use meridian_store::{
    AuthScope, MemoryServiceRepo, MemoryShareRepo, ServiceRepository, ShareRepository,
};

struct Fixture {
    services: Arc<MemoryServiceRepo>,
    shares: Arc<MemoryShareRepo>,
    authz: AuthzEvaluator,
}

fn fixture() -> Fixture {
    let services = Arc::new(MemoryServiceRepo::new());
    let shares = Arc::new(MemoryShareRepo::new());
    let authz = AuthzEvaluator::new(
        Arc::clone(&services) as Arc<dyn ServiceRepository>,
        Arc::clone(&shares) as Arc<dyn ShareRepository>,
        Arc::new(SystemClock),
    );
    Fixture { services, shares, authz }
}

fn seed_service(fixture: &Fixture, id: &str, owner: Option<&str>, creator: &str) -> ServiceId {
    let mut service = ApplicationService::new(
        ServiceId::parse(id).unwrap(),
        id,
        ["prod".to_owned(), "dev".to_owned()],
        UserId::parse(creator).unwrap(),
        Utc::now(),
    )
    .unwrap();
    service.owner_team_id = owner.map(|team| TeamId::parse(team).unwrap());
    fixture.services.save(service).unwrap().id
}

fn actor(user: &str, teams: &[&str]) -> Actor {
    Actor::new(
        UserId::parse(user).unwrap(),
        teams.iter().map(|team| TeamId::parse(*team).unwrap()),
        [],
    )
}

fn team_share(
    service: &ServiceId,
    team: &str,
    permissions: &[Permission],
    environments: &[&str],
) -> ServiceShare {
    ServiceShare {
        id: ShareId::generate(),
        resource_level: ResourceLevel::Service,
        service_id: service.clone(),
        instance_id: None,
        grantee: Grantee { kind: GranteeType::Team, id: team.to_owned() },
        permissions: permissions.iter().copied().collect(),
        environments: environments.iter().map(|env| (*env).to_owned()).collect(),
        expires_at: None,
        created_at: Utc::now(),
        created_by: UserId::parse("owner-user").unwrap(),
    }
}

#[test]
fn sys_admin_bypasses_everything() {
    let fx = fixture();
    // Service does not even exist; the role short-circuits first.
    let admin = Actor::new(UserId::parse("root").unwrap(), [], [Role::SysAdmin]);
    let request = AccessRequest::service(
        Permission::EditService,
        ServiceId::parse("ghost").unwrap(),
    );
    assert!(fx.authz.authorize(&admin, &request).is_ok());
    assert_eq!(fx.authz.list_scope(&admin).unwrap(), AuthScope::Unrestricted);
}

#[test]
fn ownership_grants_the_owner_bundle() {
    let fx = fixture();
    let svc = seed_service(&fx, "svc-a", Some("team-a"), "creator-user");

    let member = actor("some-user", &["team-a"]);
    for action in meridian_core::OWNER_BUNDLE {
        assert!(fx.authz.authorize(&member, &AccessRequest::service(action, svc.clone())).is_ok());
    }

    // The creator keeps access even with ownership unassigned elsewhere.
    let creator = actor("creator-user", &[]);
    assert!(fx
        .authz
        .authorize(&creator, &AccessRequest::service(Permission::ManageShares, svc))
        .is_ok());
}

#[test]
fn outsiders_are_denied_and_missing_services_are_not_found() {
    let fx = fixture();
    let svc = seed_service(&fx, "svc-a", Some("team-a"), "creator-user");
    let outsider = actor("mallory", &["team-z"]);

    let err = fx
        .authz
        .authorize(&outsider, &AccessRequest::service(Permission::ViewService, svc))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = fx
        .authz
        .authorize(
            &outsider,
            &AccessRequest::service(Permission::ViewService, ServiceId::parse("ghost").unwrap()),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn shares_grant_their_union_with_environment_filtering() {
    let fx = fixture();
    let svc = seed_service(&fx, "svc-a", Some("team-a"), "creator-user");
    fx.shares
        .save(team_share(&svc, "team-b", &[Permission::ViewService], &[]))
        .unwrap();
    fx.shares
        .save(team_share(&svc, "team-b", &[Permission::ViewDrift], &["prod"]))
        .unwrap();

    let grantee = actor("bob", &["team-b"]);
    assert!(fx
        .authz
        .authorize(&grantee, &AccessRequest::service(Permission::ViewService, svc.clone()))
        .is_ok());
    // ViewDrift only applies in prod.
    assert!(fx
        .authz
        .authorize(
            &grantee,
            &AccessRequest::service(Permission::ViewDrift, svc.clone()).in_environment("prod"),
        )
        .is_ok());
    assert!(fx
        .authz
        .authorize(
            &grantee,
            &AccessRequest::service(Permission::ViewDrift, svc.clone()).in_environment("dev"),
        )
        .is_err());
    // Nothing granted EditService.
    assert!(fx
        .authz
        .authorize(&grantee, &AccessRequest::service(Permission::EditService, svc.clone()))
        .is_err());

    let effective = fx
        .authz
        .effective_permissions(&grantee, &svc, Some("prod"))
        .unwrap();
    assert_eq!(
        effective,
        [Permission::ViewService, Permission::ViewDrift].into_iter().collect()
    );
}

#[test]
fn expired_shares_stop_granting() {
    let fx = fixture();
    let svc = seed_service(&fx, "svc-a", Some("team-a"), "creator-user");
    let mut share = team_share(&svc, "team-b", &[Permission::ViewService], &[]);
    share.expires_at = Some(Utc::now() - Duration::seconds(5));
    // created before it expired, so the insert is accepted for audit
    share.created_at = Utc::now() - Duration::seconds(60);
    fx.shares.save(share).unwrap();

    let grantee = actor("bob", &["team-b"]);
    assert!(fx
        .authz
        .authorize(&grantee, &AccessRequest::service(Permission::ViewService, svc))
        .is_err());
}

#[test]
fn instance_level_share_covers_only_its_instance() {
    let fx = fixture();
    let svc = seed_service(&fx, "svc-a", Some("team-a"), "creator-user");
    let mut share = team_share(&svc, "team-b", &[Permission::RestartInstance], &[]);
    share.resource_level = ResourceLevel::Instance;
    share.instance_id = Some(InstanceId::parse("i-1").unwrap());
    fx.shares.save(share).unwrap();

    let grantee = actor("bob", &["team-b"]);
    let allowed = AccessRequest::service(Permission::RestartInstance, svc.clone())
        .on_instance(InstanceId::parse("i-1").unwrap());
    assert!(fx.authz.authorize(&grantee, &allowed).is_ok());

    let other = AccessRequest::service(Permission::RestartInstance, svc.clone())
        .on_instance(InstanceId::parse("i-2").unwrap());
    assert!(fx.authz.authorize(&grantee, &other).is_err());

    let service_wide = AccessRequest::service(Permission::RestartInstance, svc);
    assert!(fx.authz.authorize(&grantee, &service_wide).is_err());
}

#[test]
fn list_scope_unions_owned_and_shared() {
    let fx = fixture();
    let owned = seed_service(&fx, "svc-own", Some("team-a"), "creator-x");
    let shared = seed_service(&fx, "svc-shared", Some("team-z"), "creator-y");
    let _invisible = seed_service(&fx, "svc-hidden", Some("team-z"), "creator-y");
    fx.shares
        .save(team_share(&shared, "team-a", &[Permission::ViewService], &[]))
        .unwrap();

    let member = actor("bob", &["team-a"]);
    let scope = fx.authz.list_scope(&member).unwrap();
    let expected: BTreeSet<ServiceId> = [owned, shared].into_iter().collect();
    assert_eq!(scope, AuthScope::ServiceIds(expected));
}

proptest! {
    /// Adding a share can only expand effective permissions; removing it
    /// can only shrink them.
    #[test]
    fn shares_are_monotonic(
        base_mask in 0_u8..64,
        extra_mask in 1_u8..64,
    ) {
        let all = meridian_core::SHAREABLE_PERMISSIONS;
        let pick = |mask: u8| -> Vec<Permission> {
            all.iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, p)| *p)
                .collect()
        };
        let base = pick(base_mask);
        let extra = pick(extra_mask);
        prop_assume!(!extra.is_empty());

        let fx = fixture();
        let svc = seed_service(&fx, "svc-a", Some("team-owner"), "creator-user");
        if !base.is_empty() {
            fx.shares.save(team_share(&svc, "team-b", &base, &[])).unwrap();
        }
        let grantee = actor("bob", &["team-b"]);
        let before = fx.authz.effective_permissions(&grantee, &svc, None).unwrap();

        // Different environment filter so the duplicate-grant rule cannot trip.
        let addition = {
            let mut share = team_share(&svc, "team-b", &extra, &["prod"]);
            share.environments.clear();
            share.environments.insert("prod".to_owned());
            share
        };
        let added_id = fx.shares.save(addition).unwrap().id;
        let after = fx.authz.effective_permissions(&grantee, &svc, Some("prod")).unwrap();
        prop_assert!(after.is_superset(&before));

        fx.shares.delete_by_id(&added_id).unwrap();
        let removed = fx.authz.effective_permissions(&grantee, &svc, Some("prod")).unwrap();
        prop_assert!(removed.is_subset(&after));
    }
}
