// SPDX-License-Identifier: Apache-2.0
//! In-memory approval repository.

use std::collections::HashMap;
use std::sync::RwLock;

use meridian_core::{
    codes, ApprovalDecision, ApprovalRequest, ApprovalStatus, Page, PageRequest, PlaneError,
    PlaneResult, RequestId, ServiceId, SortDir, SortKey,
};

use crate::criteria::ApprovalCriteria;
use crate::memory::{directed, poisoned};
use crate::ports::ApprovalRepository;

#[derive(Default)]
struct Rows {
    requests: HashMap<RequestId, ApprovalRequest>,
    decisions: Vec<ApprovalDecision>,
}

/// `RwLock<HashMap>`-backed [`ApprovalRepository`].
#[derive(Default)]
pub struct MemoryApprovalRepo {
    rows: RwLock<Rows>,
}

impl MemoryApprovalRepo {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(criteria: &ApprovalCriteria, request: &ApprovalRequest) -> bool {
    if let Some(service_id) = &criteria.target_service_id {
        if &request.target_service_id != service_id {
            return false;
        }
    }
    if let Some(team_id) = &criteria.target_team_id {
        if &request.target_team_id != team_id {
            return false;
        }
    }
    if let Some(status) = criteria.status {
        if request.status != status {
            return false;
        }
    }
    if let Some(requester) = &criteria.requester_user_id {
        if &request.requester_user_id != requester {
            return false;
        }
    }
    criteria.scope.admits(&request.target_service_id)
}

fn sort(rows: &mut [ApprovalRequest], page: PageRequest) {
    let (key, dir) = page.sort.unwrap_or((SortKey::UpdatedAt, SortDir::Desc));
    rows.sort_by(|a, b| {
        let primary = match key {
            SortKey::Id => directed(a.id.cmp(&b.id), dir),
            SortKey::UpdatedAt | SortKey::DetectedAt | SortKey::LastSeenAt => {
                directed(a.updated_at.cmp(&b.updated_at), dir)
            }
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}

impl ApprovalRepository for MemoryApprovalRepo {
    fn insert(&self, mut request: ApprovalRequest) -> PlaneResult<ApprovalRequest> {
        const OP: &str = "approval.insert";
        let mut rows = self.rows.write().map_err(|_| poisoned(OP))?;
        // Transactional stand-in for the unique partial index on
        // {requester_user_id, target_service_id} where status = PENDING.
        let duplicate = rows.requests.values().any(|existing| {
            existing.status == ApprovalStatus::Pending
                && existing.requester_user_id == request.requester_user_id
                && existing.target_service_id == request.target_service_id
        });
        if duplicate {
            return Err(PlaneError::conflict(
                codes::APPROVAL_DUPLICATE_PENDING,
                OP,
                format!(
                    "user {} already has a pending request for service {}",
                    request.requester_user_id, request.target_service_id
                ),
            ));
        }
        if request.version != 0 {
            return Err(PlaneError::conflict(
                codes::VERSION_CONFLICT,
                OP,
                "a new request must be inserted at version 0",
            ));
        }
        request.version = 1;
        rows.requests.insert(request.id, request.clone());
        Ok(request)
    }

    fn compare_and_save(
        &self,
        mut request: ApprovalRequest,
        expected_version: u64,
    ) -> PlaneResult<ApprovalRequest> {
        const OP: &str = "approval.compare_and_save";
        let mut rows = self.rows.write().map_err(|_| poisoned(OP))?;
        let Some(stored) = rows.requests.get(&request.id) else {
            return Err(PlaneError::not_found(
                codes::ENTITY_NOT_FOUND,
                OP,
                format!("request {} does not exist", request.id),
            ));
        };
        if stored.version != expected_version {
            return Err(PlaneError::conflict(
                codes::VERSION_CONFLICT,
                OP,
                format!(
                    "request {} is at version {}, not {expected_version}",
                    request.id, stored.version
                ),
            ));
        }
        request.version = expected_version + 1;
        rows.requests.insert(request.id, request.clone());
        Ok(request)
    }

    fn find_by_id(&self, id: &RequestId) -> PlaneResult<Option<ApprovalRequest>> {
        let rows = self.rows.read().map_err(|_| poisoned("approval.find_by_id"))?;
        Ok(rows.requests.get(id).cloned())
    }

    fn find_pending_for_service(
        &self,
        service_id: &ServiceId,
    ) -> PlaneResult<Vec<ApprovalRequest>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| poisoned("approval.find_pending_for_service"))?;
        let mut pending: Vec<ApprovalRequest> = rows
            .requests
            .values()
            .filter(|request| {
                request.status == ApprovalStatus::Pending
                    && &request.target_service_id == service_id
            })
            .cloned()
            .collect();
        pending.sort_by_key(|request| request.created_at);
        Ok(pending)
    }

    fn find_all(
        &self,
        criteria: &ApprovalCriteria,
        page: PageRequest,
    ) -> PlaneResult<Page<ApprovalRequest>> {
        let rows = self.rows.read().map_err(|_| poisoned("approval.find_all"))?;
        let mut matching: Vec<ApprovalRequest> = rows
            .requests
            .values()
            .filter(|request| matches(criteria, request))
            .cloned()
            .collect();
        sort(&mut matching, page);
        Ok(Page::from_sorted(matching, page))
    }

    fn add_decision(&self, decision: ApprovalDecision) -> PlaneResult<ApprovalDecision> {
        const OP: &str = "approval.add_decision";
        let mut rows = self.rows.write().map_err(|_| poisoned(OP))?;
        let double_vote = rows.decisions.iter().any(|existing| {
            existing.request_id == decision.request_id
                && existing.gate == decision.gate
                && existing.actor_user_id == decision.actor_user_id
        });
        if double_vote {
            return Err(PlaneError::conflict(
                codes::APPROVAL_DOUBLE_VOTE,
                OP,
                format!(
                    "user {} already voted on gate {:?} of request {}",
                    decision.actor_user_id, decision.gate, decision.request_id
                ),
            ));
        }
        rows.decisions.push(decision.clone());
        Ok(decision)
    }

    fn decisions_for(&self, request_id: &RequestId) -> PlaneResult<Vec<ApprovalDecision>> {
        let rows = self.rows.read().map_err(|_| poisoned("approval.decisions_for"))?;
        Ok(rows
            .decisions
            .iter()
            .filter(|decision| &decision.request_id == request_id)
            .cloned()
            .collect())
    }
}
