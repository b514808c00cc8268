// SPDX-License-Identifier: Apache-2.0
//! In-memory service repository.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use meridian_core::{
    codes, ApplicationService, Page, PageRequest, PlaneError, PlaneResult, ServiceId, SortDir,
    SortKey,
};

use crate::criteria::ServiceCriteria;
use crate::memory::{directed, poisoned};
use crate::ports::ServiceRepository;

/// `RwLock<HashMap>`-backed [`ServiceRepository`].
#[derive(Default)]
pub struct MemoryServiceRepo {
    rows: RwLock<HashMap<ServiceId, ApplicationService>>,
}

impl MemoryServiceRepo {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(criteria: &ServiceCriteria, service: &ApplicationService) -> bool {
    if let Some(lifecycle) = criteria.lifecycle {
        if service.lifecycle != lifecycle {
            return false;
        }
    }
    if let Some(owner) = &criteria.owner_team_id {
        if service.owner_team_id.as_ref() != Some(owner) {
            return false;
        }
    }
    if let Some(fragment) = &criteria.name_contains {
        if !service.display_name.contains(fragment) {
            return false;
        }
    }
    criteria.scope.admits(&service.id)
}

fn sort(rows: &mut [ApplicationService], page: PageRequest) {
    let (key, dir) = page.sort.unwrap_or((SortKey::UpdatedAt, SortDir::Desc));
    rows.sort_by(|a, b| {
        let primary = match key {
            SortKey::Id => directed(a.id.cmp(&b.id), dir),
            // Unsupported keys fall back to the default ordering.
            SortKey::UpdatedAt | SortKey::DetectedAt | SortKey::LastSeenAt => {
                directed(a.updated_at.cmp(&b.updated_at), dir)
            }
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}

impl ServiceRepository for MemoryServiceRepo {
    fn save(&self, mut service: ApplicationService) -> PlaneResult<ApplicationService> {
        const OP: &str = "service.save";
        let mut rows = self.rows.write().map_err(|_| poisoned(OP))?;
        let stored_version = rows.get(&service.id).map(|stored| stored.version);
        match stored_version {
            Some(stored) if stored != service.version => {
                return Err(PlaneError::conflict(
                    codes::VERSION_CONFLICT,
                    OP,
                    format!("service {} is at version {stored}, not {}", service.id, service.version),
                ));
            }
            None if service.version != 0 => {
                return Err(PlaneError::conflict(
                    codes::VERSION_CONFLICT,
                    OP,
                    format!("service {} does not exist yet", service.id),
                ));
            }
            _ => {}
        }
        service.version += 1;
        rows.insert(service.id.clone(), service.clone());
        Ok(service)
    }

    fn find_by_id(&self, id: &ServiceId) -> PlaneResult<Option<ApplicationService>> {
        let rows = self.rows.read().map_err(|_| poisoned("service.find_by_id"))?;
        Ok(rows.get(id).cloned())
    }

    fn find_by_display_names(&self, names: &[String]) -> PlaneResult<Vec<ApplicationService>> {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        let rows = self
            .rows
            .read()
            .map_err(|_| poisoned("service.find_by_display_names"))?;
        Ok(rows
            .values()
            .filter(|service| wanted.contains(service.display_name.as_str()))
            .cloned()
            .collect())
    }

    fn find_all(
        &self,
        criteria: &ServiceCriteria,
        page: PageRequest,
    ) -> PlaneResult<Page<ApplicationService>> {
        let rows = self.rows.read().map_err(|_| poisoned("service.find_all"))?;
        let mut matching: Vec<ApplicationService> = rows
            .values()
            .filter(|service| matches(criteria, service))
            .cloned()
            .collect();
        sort(&mut matching, page);
        Ok(Page::from_sorted(matching, page))
    }

    fn find_owned(
        &self,
        user: &meridian_core::UserId,
        teams: &std::collections::BTreeSet<meridian_core::TeamId>,
    ) -> PlaneResult<Vec<ServiceId>> {
        let rows = self.rows.read().map_err(|_| poisoned("service.find_owned"))?;
        Ok(rows
            .values()
            .filter(|service| {
                &service.created_by == user
                    || service
                        .owner_team_id
                        .as_ref()
                        .is_some_and(|owner| teams.contains(owner))
            })
            .map(|service| service.id.clone())
            .collect())
    }

    fn delete_by_id(&self, id: &ServiceId) -> PlaneResult<bool> {
        let mut rows = self.rows.write().map_err(|_| poisoned("service.delete_by_id"))?;
        Ok(rows.remove(id).is_some())
    }
}
