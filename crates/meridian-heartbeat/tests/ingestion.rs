// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]
//! End-to-end ingestion through the queue, batch loop, and worker pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use meridian_core::{
    ApplicationService, ErrorKind, Heartbeat, InstanceId, ServiceId, UserId,
};
use meridian_heartbeat::{
    spawn_pipeline, BatcherConfig, DriftPipeline, EnvSeverityPolicy, FixedExpectedHashes,
    HeartbeatQueue, WorkerConfig,
};
use meridian_resilience::{Clock, SystemClock};
use meridian_store::{
    DriftRepository, InstanceRepository, MemoryDriftRepo, MemoryInstanceRepo, MemoryServiceRepo,
    ServiceRepository,
};

const EXPECTED: &str = "aaa";

fn build() -> (Arc<MemoryInstanceRepo>, Arc<MemoryDriftRepo>, Arc<DriftPipeline>) {
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

    let pipeline = Arc::new(DriftPipeline::new(
        services as Arc<dyn ServiceRepository>,
        Arc::clone(&instances) as Arc<dyn InstanceRepository>,
        Arc::clone(&drift) as Arc<dyn DriftRepository>,
        expected as Arc<dyn meridian_heartbeat::ExpectedHashSource>,
        Arc::new(EnvSeverityPolicy::default()),
        Arc::new(SystemClock) as Arc<dyn Clock>,
    ));
    (instances, drift, pipeline)
}

fn heartbeat(instance: &str, hash: &str) -> Heartbeat {
    Heartbeat {
        service_name: "svc-a".into(),
        instance_id: InstanceId::parse(instance).unwrap(),
        config_hash: Some(hash.to_owned()),
        host: None,
        port: None,
        environment: Some("prod".into()),
        version: None,
        metadata: BTreeMap::new(),
        received_at: Utc::now(),
    }
}

#[tokio::test]
async fn reports_flow_through_to_storage() {
    let (instances, drift, pipeline) = build();
    let config = WorkerConfig {
        queue_capacity: 64,
        workers: 2,
        batcher: BatcherConfig { max_batch_size: 8, max_batch_delay: Duration::from_millis(20) },
    };
    let (queue, handle) = spawn_pipeline(pipeline, config);

    for i in 0..6 {
        queue.submit(heartbeat(&format!("i-{i}"), "bbb")).unwrap();
    }
    drop(queue);
    handle.join().await;

    for i in 0..6 {
        let stored = instances
            .find_by_id(&InstanceId::parse(format!("i-{i}")).unwrap())
            .unwrap()
            .unwrap();
        assert!(stored.has_drift, "i-{i} should drift");
        let events = drift
            .find_unresolved("svc-a", &stored.instance_id)
            .unwrap();
        assert_eq!(events.len(), 1, "i-{i} one event");
    }
}

#[tokio::test]
async fn full_queue_rejects_explicitly() {
    let (queue, mut receiver) = HeartbeatQueue::bounded(2);
    queue.submit(heartbeat("i-1", EXPECTED)).unwrap();
    queue.submit(heartbeat("i-2", EXPECTED)).unwrap();
    let err = queue.submit(heartbeat("i-3", EXPECTED)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overloaded);

    // Draining one slot lets the producer in again.
    receiver.recv().await.unwrap();
    queue.submit(heartbeat("i-3", EXPECTED)).unwrap();

    // A shut-down pipeline is a different failure than a full one.
    drop(receiver);
    let err = queue.submit(heartbeat("i-4", EXPECTED)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
}
