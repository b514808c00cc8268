// SPDX-License-Identifier: Apache-2.0
//! In-memory drift-event repository.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use meridian_core::{
    codes, DriftEvent, DriftStatus, EventId, InstanceId, Page, PageRequest, PlaneError,
    PlaneResult, ServiceId, SortDir, SortKey, TeamId,
};

use crate::criteria::DriftCriteria;
use crate::memory::{directed, poisoned};
use crate::ports::DriftRepository;

/// The idempotency key for detected events: service, instance, and the
/// detection instant truncated to the millisecond.
type DedupKey = (String, InstanceId, i64);

fn dedup_key(event: &DriftEvent) -> DedupKey {
    (
        event.service_name.clone(),
        event.instance_id.clone(),
        event.detected_at.timestamp_millis(),
    )
}

#[derive(Default)]
struct Rows {
    events: HashMap<EventId, DriftEvent>,
    dedup: HashSet<DedupKey>,
}

/// `RwLock<HashMap>`-backed [`DriftRepository`].
#[derive(Default)]
pub struct MemoryDriftRepo {
    rows: RwLock<Rows>,
}

impl MemoryDriftRepo {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(criteria: &DriftCriteria, event: &DriftEvent) -> bool {
    if let Some(name) = &criteria.service_name {
        if &event.service_name != name {
            return false;
        }
    }
    if let Some(instance_id) = &criteria.instance_id {
        if &event.instance_id != instance_id {
            return false;
        }
    }
    if let Some(status) = criteria.status {
        if event.status != status {
            return false;
        }
    }
    if let Some(severity) = criteria.severity {
        if event.severity != severity {
            return false;
        }
    }
    if let Some(environment) = &criteria.environment {
        if event.environment.as_ref() != Some(environment) {
            return false;
        }
    }
    if let Some(after) = criteria.detected_after {
        if event.detected_at < after {
            return false;
        }
    }
    if let Some(before) = criteria.detected_before {
        if event.detected_at >= before {
            return false;
        }
    }
    criteria.scope.admits(&event.service_id)
}

fn sort(rows: &mut [DriftEvent], page: PageRequest) {
    let (key, dir) = page.sort.unwrap_or((SortKey::UpdatedAt, SortDir::Desc));
    rows.sort_by(|a, b| {
        let primary = match key {
            SortKey::Id => directed(a.id.cmp(&b.id), dir),
            SortKey::DetectedAt => directed(a.detected_at.cmp(&b.detected_at), dir),
            SortKey::UpdatedAt | SortKey::LastSeenAt => {
                directed(a.updated_at.cmp(&b.updated_at), dir)
            }
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}

impl DriftRepository for MemoryDriftRepo {
    fn save(&self, event: DriftEvent) -> PlaneResult<DriftEvent> {
        const OP: &str = "drift.save";
        let mut rows = self.rows.write().map_err(|_| poisoned(OP))?;
        let Some(stored) = rows.events.get(&event.id) else {
            return Err(PlaneError::not_found(
                codes::ENTITY_NOT_FOUND,
                OP,
                format!("drift event {} does not exist", event.id),
            ));
        };
        if stored.status == DriftStatus::Resolved {
            // Resolved events are frozen except for notes.
            let mut allowed = stored.clone();
            allowed.notes.clone_from(&event.notes);
            allowed.updated_at = event.updated_at;
            if allowed != event {
                return Err(PlaneError::conflict(
                    codes::LIFECYCLE_CONFLICT,
                    OP,
                    format!("resolved event {} only accepts note changes", event.id),
                ));
            }
        }
        rows.events.insert(event.id, event.clone());
        Ok(event)
    }

    fn find_by_id(&self, id: &EventId) -> PlaneResult<Option<DriftEvent>> {
        let rows = self.rows.read().map_err(|_| poisoned("drift.find_by_id"))?;
        Ok(rows.events.get(id).cloned())
    }

    fn insert_detected(&self, events: Vec<DriftEvent>) -> PlaneResult<usize> {
        let mut rows = self.rows.write().map_err(|_| poisoned("drift.insert_detected"))?;
        let mut inserted = 0;
        for event in events {
            let key = dedup_key(&event);
            if rows.dedup.contains(&key) {
                continue;
            }
            rows.dedup.insert(key);
            rows.events.insert(event.id, event);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn find_unresolved(
        &self,
        service_name: &str,
        instance_id: &InstanceId,
    ) -> PlaneResult<Vec<DriftEvent>> {
        let rows = self.rows.read().map_err(|_| poisoned("drift.find_unresolved"))?;
        let mut unresolved: Vec<DriftEvent> = rows
            .events
            .values()
            .filter(|event| {
                event.service_name == service_name
                    && &event.instance_id == instance_id
                    && event.is_unresolved()
            })
            .cloned()
            .collect();
        unresolved.sort_by_key(|event| event.detected_at);
        Ok(unresolved)
    }

    fn resolve_all_for_instance(
        &self,
        service_name: &str,
        instance_id: &InstanceId,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> PlaneResult<usize> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| poisoned("drift.resolve_all_for_instance"))?;
        let mut resolved = 0;
        for event in rows.events.values_mut() {
            if event.service_name == service_name
                && &event.instance_id == instance_id
                && event.is_unresolved()
            {
                event.resolve(resolved_by, at)?;
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    fn find_all(
        &self,
        criteria: &DriftCriteria,
        page: PageRequest,
    ) -> PlaneResult<Page<DriftEvent>> {
        let rows = self.rows.read().map_err(|_| poisoned("drift.find_all"))?;
        let mut matching: Vec<DriftEvent> = rows
            .events
            .values()
            .filter(|event| matches(criteria, event))
            .cloned()
            .collect();
        sort(&mut matching, page);
        Ok(Page::from_sorted(matching, page))
    }

    fn bulk_update_team_id_by_service_id(
        &self,
        service_id: &ServiceId,
        new_team: Option<&TeamId>,
    ) -> PlaneResult<usize> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| poisoned("drift.bulk_update_team_id"))?;
        let mut touched = 0;
        for event in rows.events.values_mut() {
            if &event.service_id == service_id {
                event.team_id = new_team.cloned();
                touched += 1;
            }
        }
        Ok(touched)
    }
}
