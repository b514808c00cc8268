// SPDX-License-Identifier: Apache-2.0
//! The drift pipeline: diff one batch against stored state and persist.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use meridian_core::{
    drift_between, ApplicationService, DriftEvent, DriftStatus, EventId, Heartbeat, InstanceId,
    InstanceStatus, PlaneResult, ServiceId, ServiceInstance,
};
use meridian_resilience::Clock;
use meridian_store::{DriftRepository, InstanceRepository, ServiceRepository};

use crate::batcher::Batch;
use crate::severity::SeverityPolicy;

/// Where the pipeline reads the authoritative expected digest from.
///
/// In production this is backed by the KV store plus the canonical
/// snapshot hasher; tests pin digests directly. `Ok(None)` means the
/// authority has no configuration for this service/environment — the
/// instance then cannot drift.
pub trait ExpectedHashSource: Send + Sync {
    /// The expected digest for `service` in `environment`.
    fn expected_hash(
        &self,
        service: &ApplicationService,
        environment: Option<&str>,
    ) -> PlaneResult<Option<String>>;
}

/// Pinned digests for tests and bootstrap tooling.
#[derive(Default)]
pub struct FixedExpectedHashes {
    by_service: RwLock<HashMap<ServiceId, String>>,
}

impl FixedExpectedHashes {
    /// An empty source (nothing has an expected digest).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the digest for one service.
    pub fn set(&self, service_id: ServiceId, hash: impl Into<String>) {
        if let Ok(mut map) = self.by_service.write() {
            map.insert(service_id, hash.into());
        }
    }
}

impl ExpectedHashSource for FixedExpectedHashes {
    fn expected_hash(
        &self,
        service: &ApplicationService,
        _environment: Option<&str>,
    ) -> PlaneResult<Option<String>> {
        Ok(self
            .by_service
            .read()
            .ok()
            .and_then(|map| map.get(&service.id).cloned()))
    }
}

/// Counters for one processed batch.
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    /// Heartbeats that went through diff & build.
    pub processed: usize,
    /// Instances created.
    pub inserted_instances: usize,
    /// Instances rewritten.
    pub modified_instances: usize,
    /// Drift events opened.
    pub drift_opened: usize,
    /// Drift events auto-resolved.
    pub drift_resolved: usize,
    /// Heartbeats dropped for carrying a stale `received_at`.
    pub stale_dropped: usize,
    /// Heartbeats dropped by in-window dedup (carried from the batcher).
    pub duplicates_dropped: usize,
    /// Service names no registered service matched.
    pub unknown_services: Vec<String>,
}

/// Diffs heartbeat batches against stored state and persists the result.
pub struct DriftPipeline {
    services: Arc<dyn ServiceRepository>,
    instances: Arc<dyn InstanceRepository>,
    drift: Arc<dyn DriftRepository>,
    expected: Arc<dyn ExpectedHashSource>,
    severity: Arc<dyn SeverityPolicy>,
    clock: Arc<dyn Clock>,
}

impl DriftPipeline {
    /// Wire a pipeline over its ports.
    #[must_use]
    pub fn new(
        services: Arc<dyn ServiceRepository>,
        instances: Arc<dyn InstanceRepository>,
        drift: Arc<dyn DriftRepository>,
        expected: Arc<dyn ExpectedHashSource>,
        severity: Arc<dyn SeverityPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { services, instances, drift, expected, severity, clock }
    }

    /// Process one batch to completion: resolve services, load instances,
    /// diff every heartbeat, then persist in two ordered bulk writes
    /// (instances first, then drift events).
    pub fn process_batch(&self, batch: Batch) -> PlaneResult<BatchOutcome> {
        let mut outcome = BatchOutcome {
            duplicates_dropped: batch.duplicates_dropped,
            ..BatchOutcome::default()
        };
        if batch.heartbeats.is_empty() {
            return Ok(outcome);
        }

        // Latest-wins dedup. The batcher already did this for queue
        // traffic; doing it again here keeps direct callers safe too.
        let mut latest: FxHashMap<InstanceId, Heartbeat> = FxHashMap::default();
        for heartbeat in batch.heartbeats {
            use std::collections::hash_map::Entry;
            match latest.entry(heartbeat.instance_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(heartbeat);
                }
                Entry::Occupied(mut slot) => {
                    outcome.duplicates_dropped += 1;
                    if heartbeat.received_at >= slot.get().received_at {
                        slot.insert(heartbeat);
                    }
                }
            }
        }
        let heartbeats: Vec<Heartbeat> = latest.into_values().collect();

        // Stage 2: one bulk service lookup for the distinct name set.
        let names: BTreeSet<String> = heartbeats
            .iter()
            .map(|heartbeat| heartbeat.service_name.clone())
            .collect();
        let names: Vec<String> = names.into_iter().collect();
        let services: FxHashMap<String, ApplicationService> = self
            .services
            .find_by_display_names(&names)?
            .into_iter()
            .map(|service| (service.display_name.clone(), service))
            .collect();

        // Stage 3: one bulk instance load.
        let ids: Vec<InstanceId> = heartbeats
            .iter()
            .map(|heartbeat| heartbeat.instance_id.clone())
            .collect();
        let existing: FxHashMap<InstanceId, ServiceInstance> = self
            .instances
            .find_by_instance_ids(&ids)?
            .into_iter()
            .map(|instance| (instance.instance_id.clone(), instance))
            .collect();

        // Stage 4: diff & build.
        let mut upserts: Vec<ServiceInstance> = Vec::with_capacity(heartbeats.len());
        let mut opened: Vec<DriftEvent> = Vec::new();
        let mut leaving: Vec<(String, InstanceId)> = Vec::new();
        let mut unknown: BTreeSet<String> = BTreeSet::new();

        for heartbeat in heartbeats {
            let Some(service) = services.get(&heartbeat.service_name) else {
                unknown.insert(heartbeat.service_name.clone());
                continue;
            };
            let prior = existing.get(&heartbeat.instance_id);
            if let Some(prior) = prior {
                if heartbeat.received_at < prior.last_seen_at {
                    outcome.stale_dropped += 1;
                    continue;
                }
            }
            outcome.processed += 1;
            let had_drift = prior.is_some_and(|instance| instance.has_drift);
            let next = self.build_instance(service, prior, &heartbeat)?;
            if next.has_drift && !had_drift {
                opened.push(self.open_event(service, &next, &heartbeat));
            }
            if !next.has_drift && had_drift {
                leaving.push((next.service_name.clone(), next.instance_id.clone()));
            }
            upserts.push(next);
        }
        outcome.unknown_services = unknown.into_iter().collect();
        if !outcome.unknown_services.is_empty() {
            warn!(services = ?outcome.unknown_services, "heartbeats for unregistered services");
        }

        // Stage 5: persist — instances first, then drift bookkeeping.
        let bulk = self.instances.bulk_upsert(upserts)?;
        outcome.inserted_instances = bulk.inserted;
        outcome.modified_instances = bulk.modified;

        outcome.drift_opened = self.drift.insert_detected(opened)?;
        let resolved_at = self.clock.wall_now();
        for (service_name, instance_id) in leaving {
            outcome.drift_resolved += self.drift.resolve_all_for_instance(
                &service_name,
                &instance_id,
                "system",
                resolved_at,
            )?;
        }
        debug!(
            processed = outcome.processed,
            opened = outcome.drift_opened,
            resolved = outcome.drift_resolved,
            stale = outcome.stale_dropped,
            "batch persisted"
        );
        Ok(outcome)
    }

    /// Compute the target instance record for one heartbeat.
    fn build_instance(
        &self,
        service: &ApplicationService,
        prior: Option<&ServiceInstance>,
        heartbeat: &Heartbeat,
    ) -> PlaneResult<ServiceInstance> {
        let environment = heartbeat
            .environment
            .clone()
            .or_else(|| prior.and_then(|instance| instance.environment.clone()));
        // The authority's digest; kept from the prior record when the
        // source has no answer (or is temporarily unreachable).
        let expected = match self.expected.expected_hash(service, environment.as_deref()) {
            Ok(Some(hash)) => Some(hash),
            Ok(None) => prior.and_then(|instance| instance.expected_hash.clone()),
            Err(err) => {
                warn!(
                    service = service.id.as_str(),
                    code = err.code(),
                    "expected-hash source unavailable; keeping prior digest"
                );
                prior.and_then(|instance| instance.expected_hash.clone())
            }
        };

        let mut next = match prior {
            None => ServiceInstance {
                instance_id: heartbeat.instance_id.clone(),
                service_id: service.id.clone(),
                service_name: heartbeat.service_name.clone(),
                team_id: service.owner_team_id.clone(),
                host: heartbeat.host.clone(),
                port: heartbeat.port,
                environment,
                version: heartbeat.version.clone(),
                expected_hash: expected,
                config_hash: heartbeat.config_hash.clone(),
                last_applied_hash: heartbeat.config_hash.clone(),
                status: InstanceStatus::Healthy,
                last_seen_at: heartbeat.received_at,
                has_drift: false,
                drift_detected_at: None,
                created_at: heartbeat.received_at,
                updated_at: heartbeat.received_at,
            },
            Some(prior) => {
                let mut next = prior.clone();
                next.service_id.clone_from(&service.id);
                next.team_id.clone_from(&service.owner_team_id);
                next.host = heartbeat.host.clone().or_else(|| prior.host.clone());
                next.port = heartbeat.port.or(prior.port);
                next.environment = environment;
                next.version = heartbeat.version.clone().or_else(|| prior.version.clone());
                next.expected_hash = expected;
                next.last_applied_hash.clone_from(&prior.config_hash);
                next.config_hash.clone_from(&heartbeat.config_hash);
                next.last_seen_at = heartbeat.received_at;
                next.updated_at = heartbeat.received_at;
                next
            }
        };
        next.refresh_drift(heartbeat.received_at);
        debug_assert_eq!(
            next.has_drift,
            drift_between(next.expected_hash.as_deref(), next.config_hash.as_deref())
        );
        // An instance may report itself unhealthy; drift still wins.
        if !next.has_drift && reports_unhealthy(heartbeat) {
            next.status = InstanceStatus::Unhealthy;
        }
        Ok(next)
    }

    /// Build the event for an instance entering drift.
    fn open_event(
        &self,
        service: &ApplicationService,
        instance: &ServiceInstance,
        heartbeat: &Heartbeat,
    ) -> DriftEvent {
        DriftEvent {
            id: EventId::generate(),
            service_id: service.id.clone(),
            service_name: instance.service_name.clone(),
            instance_id: instance.instance_id.clone(),
            environment: instance.environment.clone(),
            expected_hash: instance.expected_hash.clone().unwrap_or_default(),
            applied_hash: instance.config_hash.clone().unwrap_or_default(),
            severity: self
                .severity
                .derive(service, instance.environment.as_deref()),
            status: DriftStatus::Detected,
            detected_at: heartbeat.received_at,
            resolved_at: None,
            detected_by: "system".into(),
            resolved_by: None,
            team_id: service.owner_team_id.clone(),
            notes: None,
            updated_at: heartbeat.received_at,
        }
    }
}

fn reports_unhealthy(heartbeat: &Heartbeat) -> bool {
    heartbeat
        .metadata
        .get("health")
        .is_some_and(|value| value.eq_ignore_ascii_case("unhealthy"))
}
