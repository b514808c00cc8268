// SPDX-License-Identifier: Apache-2.0
//! In-memory share repository.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use meridian_core::{codes, PlaneError, PlaneResult, ServiceId, ServiceShare, ShareId};

use crate::memory::poisoned;
use crate::ports::ShareRepository;

/// `RwLock<HashMap>`-backed [`ShareRepository`].
#[derive(Default)]
pub struct MemoryShareRepo {
    rows: RwLock<HashMap<ShareId, ServiceShare>>,
}

impl MemoryShareRepo {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The active-duplicate identity: service, grantee, environment filter.
fn same_grant(a: &ServiceShare, b: &ServiceShare) -> bool {
    a.service_id == b.service_id && a.grantee == b.grantee && a.environments == b.environments
}

impl ShareRepository for MemoryShareRepo {
    fn save(&self, share: ServiceShare) -> PlaneResult<ServiceShare> {
        const OP: &str = "share.save";
        ServiceShare::validate_permissions(&share.permissions)?;
        let mut rows = self.rows.write().map_err(|_| poisoned(OP))?;
        // The insert instant is the reference point for "active": an
        // expired grant may coexist (audit), a live duplicate may not.
        let now = share.created_at;
        let duplicate = rows
            .values()
            .any(|existing| existing.id != share.id && same_grant(existing, &share) && existing.is_active(now));
        if duplicate {
            return Err(PlaneError::conflict(
                codes::LIFECYCLE_CONFLICT,
                OP,
                format!(
                    "an active share for {:?} on service {} with the same environments already exists",
                    share.grantee, share.service_id
                ),
            ));
        }
        rows.insert(share.id, share.clone());
        Ok(share)
    }

    fn find_by_id(&self, id: &ShareId) -> PlaneResult<Option<ServiceShare>> {
        let rows = self.rows.read().map_err(|_| poisoned("share.find_by_id"))?;
        Ok(rows.get(id).cloned())
    }

    fn find_by_service(&self, service_id: &ServiceId) -> PlaneResult<Vec<ServiceShare>> {
        let rows = self.rows.read().map_err(|_| poisoned("share.find_by_service"))?;
        Ok(rows
            .values()
            .filter(|share| &share.service_id == service_id)
            .cloned()
            .collect())
    }

    fn find_all(&self) -> PlaneResult<Vec<ServiceShare>> {
        let rows = self.rows.read().map_err(|_| poisoned("share.find_all"))?;
        Ok(rows.values().cloned().collect())
    }

    fn delete_by_id(&self, id: &ShareId) -> PlaneResult<bool> {
        let mut rows = self.rows.write().map_err(|_| poisoned("share.delete_by_id"))?;
        Ok(rows.remove(id).is_some())
    }

    fn find_expired(&self, now: DateTime<Utc>) -> PlaneResult<Vec<ShareId>> {
        let rows = self.rows.read().map_err(|_| poisoned("share.find_expired"))?;
        Ok(rows
            .values()
            .filter(|share| !share.is_active(now))
            .map(|share| share.id)
            .collect())
    }
}
