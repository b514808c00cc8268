// SPDX-License-Identifier: Apache-2.0
//! etcd-semantics in-memory backend.
//!
//! Models the parts of etcd that the port relies on:
//!
//! - One global **revision**, advanced once per mutating call — every op
//!   inside a transaction shares the same revision.
//! - Leases own ephemeral keys; lease expiry (or revocation) deletes the
//!   keys it owns at a fresh revision.
//! - Lock fencing tokens are the revision at acquisition, which is
//!   monotonic by construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use meridian_core::{codes, PlaneError, PlaneResult};
use meridian_resilience::Clock;

use crate::path::normalize_path;
use crate::store::{KvStore, LockId, PutOptions, PutOutcome, SessionId, TxnOp};
use crate::tree::{normalize_ops, Record, Tree};
use crate::watch::{WatchEvent, WatchHandle, WatchHandler, WatchRegistry};
use crate::KvEntry;

struct Lease {
    expires_at: Instant,
}

struct LockState {
    lock_id: LockId,
    lease: SessionId,
}

struct State {
    tree: Tree,
    leases: HashMap<SessionId, Lease>,
    locks: HashMap<String, LockState>,
    revision: u64,
    next_lease: u64,
}

/// In-memory backend with etcd-like semantics.
pub struct EtcdStore {
    state: Mutex<State>,
    watches: WatchRegistry,
    clock: Arc<dyn Clock>,
}

impl EtcdStore {
    /// An empty store reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State {
                tree: Tree::default(),
                leases: HashMap::new(),
                locks: HashMap::new(),
                revision: 0,
                next_lease: 0,
            }),
            watches: WatchRegistry::default(),
            clock,
        }
    }

    fn lock_state(&self) -> PlaneResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| PlaneError::backend_unavailable("kv.etcd", "state poisoned"))
    }

    /// Sweep lapsed leases and TTL records. Each sweep that deletes
    /// anything advances the revision once — expiry is one logical write.
    fn sweep(&self, state: &mut State, now: Instant) {
        let lapsed: Vec<SessionId> = state
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        let mut doomed: Vec<String> = state.tree.expired_keys(now);
        for lease in &lapsed {
            doomed.extend(state.tree.keys_owned_by(*lease));
        }
        doomed.sort_unstable();
        doomed.dedup();
        for lease in lapsed {
            state.leases.remove(&lease);
            state.locks.retain(|_, lock| lock.lease != lease);
        }
        if doomed.is_empty() {
            return;
        }
        state.revision += 1;
        let version = state.revision;
        for key in doomed {
            state.tree.remove(&key);
            self.watches.publish(&key, &WatchEvent::Delete(key.clone(), version));
        }
    }

    fn apply_put(
        state: &mut State,
        key: &str,
        value: &[u8],
        flags: u64,
        ttl: Option<Duration>,
        owner: Option<SessionId>,
        revision: u64,
        now: Instant,
    ) -> KvEntry {
        let create_index = state
            .tree
            .get_live(key, now)
            .map_or(revision, |record| record.create_index);
        let record = Record {
            value: value.to_vec(),
            create_index,
            modify_index: revision,
            flags,
            expires_at: ttl.map(|ttl| now + ttl),
            owner,
        };
        let entry = record.to_entry(key);
        state.tree.insert(key.to_owned(), record);
        entry
    }

    fn grant_lease(state: &mut State, ttl: Duration, now: Instant) -> SessionId {
        state.next_lease += 1;
        let id = SessionId(state.next_lease);
        state.leases.insert(id, Lease { expires_at: now + ttl });
        id
    }
}

impl KvStore for EtcdStore {
    fn get(&self, key: &str) -> PlaneResult<Option<KvEntry>> {
        let key = normalize_path(key)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        Ok(state.tree.get_live(&key, now).map(|record| record.to_entry(&key)))
    }

    fn put(&self, key: &str, value: &[u8], options: PutOptions) -> PlaneResult<PutOutcome> {
        let key = normalize_path(key)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        let current = state.tree.current_index(&key, now);
        if let Some(expected) = options.expected_index {
            if current != expected {
                return Ok(PutOutcome { success: false, modify_index: current });
            }
        }
        state.revision += 1;
        let revision = state.revision;
        let entry =
            Self::apply_put(&mut state, &key, value, options.flags, options.ttl, None, revision, now);
        self.watches.publish(&key, &WatchEvent::Put(entry));
        Ok(PutOutcome { success: true, modify_index: revision })
    }

    fn delete(&self, key: &str, expected_index: Option<u64>) -> PlaneResult<bool> {
        let key = normalize_path(key)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        let current = state.tree.current_index(&key, now);
        if current == 0 {
            return Ok(false);
        }
        if expected_index.is_some_and(|expected| expected != current) {
            return Ok(false);
        }
        state.revision += 1;
        let version = state.revision;
        state.tree.remove(&key);
        state.locks.remove(&key);
        self.watches.publish(&key, &WatchEvent::Delete(key.clone(), version));
        Ok(true)
    }

    fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        from_key: Option<&str>,
    ) -> PlaneResult<Vec<KvEntry>> {
        let prefix = normalize_path(prefix)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        Ok(state.tree.list(&prefix, limit, from_key, now))
    }

    fn txn(&self, ops: &[TxnOp]) -> PlaneResult<Vec<bool>> {
        let ops = normalize_ops(ops)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        let outcomes = state.tree.check_txn(&ops, now);
        if outcomes.iter().any(|ok| !ok) {
            return Ok(outcomes);
        }
        // All preconditions hold; the whole transaction is one revision.
        state.revision += 1;
        let revision = state.revision;
        for op in &ops {
            match op {
                TxnOp::Put { key, value, ttl, .. } => {
                    let entry =
                        Self::apply_put(&mut state, key, value, 0, *ttl, None, revision, now);
                    self.watches.publish(key, &WatchEvent::Put(entry));
                }
                TxnOp::Delete { key, .. } => {
                    if state.tree.remove(key).is_some() {
                        self.watches.publish(key, &WatchEvent::Delete(key.clone(), revision));
                    }
                }
                TxnOp::CheckIndex { .. } => {}
            }
        }
        Ok(outcomes)
    }

    fn acquire_lock(&self, key: &str, ttl: Duration) -> PlaneResult<LockId> {
        let key = normalize_path(key)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        if state.locks.contains_key(&key) {
            return Err(PlaneError::conflict(
                codes::KV_LOCK_HELD,
                "kv.acquire_lock",
                format!("lock {key:?} is held by another lease"),
            ));
        }
        let lease = Self::grant_lease(&mut state, ttl, now);
        state.revision += 1;
        let lock_id = LockId(state.revision);
        state.locks.insert(key, LockState { lock_id, lease });
        Ok(lock_id)
    }

    fn release_lock(&self, key: &str, lock_id: LockId) -> PlaneResult<bool> {
        let key = normalize_path(key)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        let Some(lock) = state.locks.get(&key) else {
            return Ok(false);
        };
        if lock.lock_id != lock_id {
            return Ok(false);
        }
        let lease = lock.lease;
        state.locks.remove(&key);
        state.leases.remove(&lease);
        Ok(true)
    }

    fn put_ephemeral(&self, key: &str, value: &[u8], ttl: Duration) -> PlaneResult<SessionId> {
        let key = normalize_path(key)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        let lease = Self::grant_lease(&mut state, ttl, now);
        state.revision += 1;
        let revision = state.revision;
        let entry = Self::apply_put(&mut state, &key, value, 0, None, Some(lease), revision, now);
        self.watches.publish(&key, &WatchEvent::Put(entry));
        Ok(lease)
    }

    fn terminate_session(&self, session: SessionId) -> PlaneResult<bool> {
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        if state.leases.remove(&session).is_none() {
            return Ok(false);
        }
        state.locks.retain(|_, lock| lock.lease != session);
        let owned = state.tree.keys_owned_by(session);
        if !owned.is_empty() {
            state.revision += 1;
            let version = state.revision;
            for key in owned {
                state.tree.remove(&key);
                self.watches.publish(&key, &WatchEvent::Delete(key.clone(), version));
            }
        }
        Ok(true)
    }

    fn watch_prefix(&self, prefix: &str, handler: Arc<dyn WatchHandler>) -> PlaneResult<WatchHandle> {
        let prefix = normalize_path(prefix)?;
        Ok(self.watches.subscribe(&prefix, handler))
    }
}
