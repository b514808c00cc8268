// SPDX-License-Identifier: Apache-2.0
//! In-memory instance repository.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use meridian_core::{
    InstanceId, InstanceStatus, Page, PageRequest, PlaneResult, ServiceId, ServiceInstance,
    SortDir, SortKey, TeamId,
};

use crate::criteria::InstanceCriteria;
use crate::memory::{directed, poisoned};
use crate::ports::{BulkOutcome, InstanceRepository};

/// `RwLock<HashMap>`-backed [`InstanceRepository`].
#[derive(Default)]
pub struct MemoryInstanceRepo {
    rows: RwLock<HashMap<InstanceId, ServiceInstance>>,
}

impl MemoryInstanceRepo {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(criteria: &InstanceCriteria, instance: &ServiceInstance) -> bool {
    if let Some(service_id) = &criteria.service_id {
        if &instance.service_id != service_id {
            return false;
        }
    }
    if let Some(status) = criteria.status {
        if instance.status != status {
            return false;
        }
    }
    if let Some(environment) = &criteria.environment {
        if instance.environment.as_ref() != Some(environment) {
            return false;
        }
    }
    if let Some(before) = criteria.last_seen_before {
        if instance.last_seen_at >= before {
            return false;
        }
    }
    criteria.scope.admits(&instance.service_id)
}

fn sort(rows: &mut [ServiceInstance], page: PageRequest) {
    let (key, dir) = page.sort.unwrap_or((SortKey::UpdatedAt, SortDir::Desc));
    rows.sort_by(|a, b| {
        let primary = match key {
            SortKey::Id => directed(a.instance_id.cmp(&b.instance_id), dir),
            SortKey::LastSeenAt => directed(a.last_seen_at.cmp(&b.last_seen_at), dir),
            SortKey::UpdatedAt | SortKey::DetectedAt => {
                directed(a.updated_at.cmp(&b.updated_at), dir)
            }
        };
        primary.then_with(|| a.instance_id.cmp(&b.instance_id))
    });
}

/// Whether `candidate` may overwrite `stored` under the monotonicity gate.
fn supersedes(candidate: &ServiceInstance, stored: &ServiceInstance) -> bool {
    candidate.last_seen_at >= stored.last_seen_at
}

impl InstanceRepository for MemoryInstanceRepo {
    fn save(&self, instance: ServiceInstance) -> PlaneResult<ServiceInstance> {
        let mut rows = self.rows.write().map_err(|_| poisoned("instance.save"))?;
        if let Some(stored) = rows.get(&instance.instance_id) {
            if !supersedes(&instance, stored) {
                return Ok(stored.clone());
            }
        }
        rows.insert(instance.instance_id.clone(), instance.clone());
        Ok(instance)
    }

    fn find_by_id(&self, id: &InstanceId) -> PlaneResult<Option<ServiceInstance>> {
        let rows = self.rows.read().map_err(|_| poisoned("instance.find_by_id"))?;
        Ok(rows.get(id).cloned())
    }

    fn find_by_instance_ids(&self, ids: &[InstanceId]) -> PlaneResult<Vec<ServiceInstance>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| poisoned("instance.find_by_instance_ids"))?;
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    fn find_all(
        &self,
        criteria: &InstanceCriteria,
        page: PageRequest,
    ) -> PlaneResult<Page<ServiceInstance>> {
        let rows = self.rows.read().map_err(|_| poisoned("instance.find_all"))?;
        let mut matching: Vec<ServiceInstance> = rows
            .values()
            .filter(|instance| matches(criteria, instance))
            .cloned()
            .collect();
        sort(&mut matching, page);
        Ok(Page::from_sorted(matching, page))
    }

    fn delete_by_id(&self, id: &InstanceId) -> PlaneResult<bool> {
        let mut rows = self.rows.write().map_err(|_| poisoned("instance.delete_by_id"))?;
        Ok(rows.remove(id).is_some())
    }

    fn bulk_upsert(&self, instances: Vec<ServiceInstance>) -> PlaneResult<BulkOutcome> {
        let mut rows = self.rows.write().map_err(|_| poisoned("instance.bulk_upsert"))?;
        let mut outcome = BulkOutcome::default();
        for instance in instances {
            use std::collections::hash_map::Entry;
            match rows.entry(instance.instance_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(instance);
                    outcome.inserted += 1;
                }
                Entry::Occupied(mut slot) if supersedes(&instance, slot.get()) => {
                    slot.insert(instance);
                    outcome.modified += 1;
                }
                // Stale writes are dropped, not errors: the pipeline may
                // legitimately race an out-of-order redelivery.
                Entry::Occupied(_) => {}
            }
        }
        Ok(outcome)
    }

    fn bulk_update_team_id_by_service_id(
        &self,
        service_id: &ServiceId,
        new_team: Option<&TeamId>,
    ) -> PlaneResult<usize> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| poisoned("instance.bulk_update_team_id"))?;
        let mut touched = 0;
        for instance in rows.values_mut() {
            if &instance.service_id == service_id {
                instance.team_id = new_team.cloned();
                touched += 1;
            }
        }
        Ok(touched)
    }

    fn find_stale(&self, cutoff: DateTime<Utc>) -> PlaneResult<Vec<ServiceInstance>> {
        let rows = self.rows.read().map_err(|_| poisoned("instance.find_stale"))?;
        Ok(rows
            .values()
            .filter(|instance| {
                instance.last_seen_at < cutoff && instance.status != InstanceStatus::Unknown
            })
            .cloned()
            .collect())
    }

    fn delete_absent_since(&self, cutoff: DateTime<Utc>) -> PlaneResult<usize> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| poisoned("instance.delete_absent_since"))?;
        let before = rows.len();
        rows.retain(|_, instance| instance.last_seen_at >= cutoff);
        Ok(before - rows.len())
    }
}
