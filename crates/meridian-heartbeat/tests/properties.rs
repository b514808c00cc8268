// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]
//! Pipeline properties over arbitrary heartbeat sequences: the drift
//! invariant always holds and `last_seen_at` never goes backwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use meridian_core::{
    drift_between, ApplicationService, Heartbeat, InstanceId, InstanceStatus, PageRequest,
    ServiceId, UserId,
};
use meridian_heartbeat::{Batch, DriftPipeline, EnvSeverityPolicy, FixedExpectedHashes};
use meridian_resilience::{Clock, ManualClock};
use meridian_store::{
    DriftRepository, InstanceCriteria, InstanceRepository, MemoryDriftRepo, MemoryInstanceRepo,
    MemoryServiceRepo, ServiceRepository,
};

const EXPECTED: &str = "aaa";

fn pipeline() -> (Arc<MemoryInstanceRepo>, DriftPipeline) {
    let services = Arc::new(MemoryServiceRepo::new());
    let instances = Arc::new(MemoryInstanceRepo::new());
    let drift = Arc::new(MemoryDriftRepo::new());
    let expected = Arc::new(FixedExpectedHashes::new());

    let service = ApplicationService::new(
        ServiceId::parse("svc-a").unwrap(),
        "svc-a",
        ["prod".to_owned()],
        UserId::parse("creator").unwrap(),
        Utc::now(),
    )
    .unwrap();
    let id = services.save(service).unwrap().id;
    expected.set(id, EXPECTED);

    let pipeline = DriftPipeline::new(
        services as Arc<dyn ServiceRepository>,
        Arc::clone(&instances) as Arc<dyn InstanceRepository>,
        drift as Arc<dyn DriftRepository>,
        expected as Arc<dyn meridian_heartbeat::ExpectedHashSource>,
        Arc::new(EnvSeverityPolicy::default()),
        Arc::new(ManualClock::new()) as Arc<dyn Clock>,
    );
    (instances, pipeline)
}

/// (instance index, optional hash choice, timestamp offset)
fn report() -> impl Strategy<Value = (u8, Option<bool>, i64)> {
    (0_u8..4, proptest::option::of(any::<bool>()), 0_i64..10_000)
}

fn heartbeat(instance: u8, matching: Option<bool>, secs: i64) -> Heartbeat {
    Heartbeat {
        service_name: "svc-a".into(),
        instance_id: InstanceId::parse(format!("i-{instance}")).unwrap(),
        config_hash: matching.map(|matches| if matches { EXPECTED.into() } else { "bbb".into() }),
        host: None,
        port: None,
        environment: Some("prod".into()),
        version: None,
        metadata: BTreeMap::new(),
        received_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After any heartbeat sequence, every stored instance satisfies
    /// `has_drift ⇔ (expected ≠ ∅ ∧ reported ≠ ∅ ∧ expected ≠ reported)`
    /// and `status == Drift ⇔ has_drift`.
    #[test]
    fn drift_invariant_holds_after_any_sequence(
        reports in proptest::collection::vec(report(), 1..40),
        batch_size in 1_usize..8,
    ) {
        let (instances, pipeline) = pipeline();
        for window in reports.chunks(batch_size) {
            let heartbeats = window
                .iter()
                .map(|(instance, matching, secs)| heartbeat(*instance, *matching, *secs))
                .collect();
            pipeline
                .process_batch(Batch { heartbeats, duplicates_dropped: 0 })
                .unwrap();
        }
        let page = instances
            .find_all(&InstanceCriteria::default(), PageRequest::first(100))
            .unwrap();
        for stored in &page.content {
            let expected_drift = drift_between(
                stored.expected_hash.as_deref(),
                stored.config_hash.as_deref(),
            );
            prop_assert_eq!(stored.has_drift, expected_drift);
            prop_assert_eq!(stored.status == InstanceStatus::Drift, stored.has_drift);
        }
    }

    /// `last_seen_at` is non-decreasing no matter how reports are
    /// interleaved or batched.
    #[test]
    fn last_seen_is_monotonic(
        reports in proptest::collection::vec(report(), 1..40),
        batch_size in 1_usize..8,
    ) {
        let (instances, pipeline) = pipeline();
        let mut high_water: BTreeMap<u8, i64> = BTreeMap::new();
        for window in reports.chunks(batch_size) {
            let heartbeats: Vec<Heartbeat> = window
                .iter()
                .map(|(instance, matching, secs)| heartbeat(*instance, *matching, *secs))
                .collect();
            for (instance, _, secs) in window {
                let entry = high_water.entry(*instance).or_insert(*secs);
                *entry = (*entry).max(*secs);
            }
            pipeline
                .process_batch(Batch { heartbeats, duplicates_dropped: 0 })
                .unwrap();
            for (instance, max_secs) in &high_water {
                let stored = instances
                    .find_by_id(&InstanceId::parse(format!("i-{instance}")).unwrap())
                    .unwrap()
                    .unwrap();
                prop_assert_eq!(
                    stored.last_seen_at,
                    Utc.timestamp_opt(1_700_000_000 + max_secs, 0).single().unwrap()
                );
            }
        }
    }
}
