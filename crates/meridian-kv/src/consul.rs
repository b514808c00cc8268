// SPDX-License-Identifier: Apache-2.0
//! Consul-semantics in-memory backend.
//!
//! Models the parts of Consul's KV that the port relies on:
//!
//! - One global index, advanced **per write** — every op in a transaction
//!   gets its own index, in op order.
//! - Sessions own ephemeral keys and locks; session expiry releases both.
//! - Lock fencing tokens are mint-order monotonic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use meridian_core::{codes, PlaneError, PlaneResult};
use meridian_resilience::Clock;

use crate::path::normalize_path;
use crate::store::{KvStore, LockId, PutOptions, PutOutcome, SessionId, TxnOp};
use crate::tree::{Record, Tree};
use crate::watch::{WatchEvent, WatchHandle, WatchHandler, WatchRegistry};
use crate::KvEntry;

struct Session {
    expires_at: Instant,
}

struct LockState {
    lock_id: LockId,
    session: SessionId,
}

struct State {
    tree: Tree,
    sessions: HashMap<SessionId, Session>,
    locks: HashMap<String, LockState>,
    index: u64,
    next_session: u64,
    next_lock: u64,
}

/// In-memory backend with Consul-like semantics.
pub struct ConsulStore {
    state: Mutex<State>,
    watches: WatchRegistry,
    clock: Arc<dyn Clock>,
}

impl ConsulStore {
    /// An empty store reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State {
                tree: Tree::default(),
                sessions: HashMap::new(),
                locks: HashMap::new(),
                index: 0,
                next_session: 0,
                next_lock: 0,
            }),
            watches: WatchRegistry::default(),
            clock,
        }
    }

    fn lock_state(&self) -> PlaneResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| PlaneError::backend_unavailable("kv.consul", "state poisoned"))
    }

    /// Sweep lapsed sessions, their keys, and lapsed TTL records. Runs at
    /// the top of every operation, under the state lock, so watchers see
    /// expiry deletes in order with ordinary writes.
    fn sweep(&self, state: &mut State, now: Instant) {
        let lapsed: Vec<SessionId> = state
            .sessions
            .iter()
            .filter(|(_, session)| session.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for session in lapsed {
            state.sessions.remove(&session);
            state.locks.retain(|_, lock| lock.session != session);
            for key in state.tree.keys_owned_by(session) {
                state.index += 1;
                let version = state.index;
                state.tree.remove(&key);
                self.watches.publish(&key, &WatchEvent::Delete(key.clone(), version));
            }
        }
        for key in state.tree.expired_keys(now) {
            state.index += 1;
            let version = state.index;
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
        now: Instant,
    ) -> KvEntry {
        state.index += 1;
        let index = state.index;
        let create_index = state
            .tree
            .get_live(key, now)
            .map_or(index, |record| record.create_index);
        let record = Record {
            value: value.to_vec(),
            create_index,
            modify_index: index,
            flags,
            expires_at: ttl.map(|ttl| now + ttl),
            owner,
        };
        let entry = record.to_entry(key);
        state.tree.insert(key.to_owned(), record);
        entry
    }

    fn mint_session(state: &mut State, ttl: Duration, now: Instant) -> SessionId {
        state.next_session += 1;
        let id = SessionId(state.next_session);
        state.sessions.insert(id, Session { expires_at: now + ttl });
        id
    }
}

impl KvStore for ConsulStore {
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
        let entry = Self::apply_put(&mut state, &key, value, options.flags, options.ttl, None, now);
        let modify_index = entry.modify_index;
        self.watches.publish(&key, &WatchEvent::Put(entry));
        Ok(PutOutcome { success: true, modify_index })
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
        state.index += 1;
        let version = state.index;
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
        let ops = crate::tree::normalize_ops(ops)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        let outcomes = state.tree.check_txn(&ops, now);
        if outcomes.iter().any(|ok| !ok) {
            return Ok(outcomes);
        }
        // All preconditions hold; apply in op order, one index per write.
        for op in &ops {
            match op {
                TxnOp::Put { key, value, ttl, .. } => {
                    let entry = Self::apply_put(&mut state, key, value, 0, *ttl, None, now);
                    self.watches.publish(key, &WatchEvent::Put(entry));
                }
                TxnOp::Delete { key, .. } => {
                    if state.tree.current_index(key, now) != 0 {
                        state.index += 1;
                        let version = state.index;
                        state.tree.remove(key);
                        self.watches.publish(key, &WatchEvent::Delete(key.clone(), version));
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
                format!("lock {key:?} is held by another session"),
            ));
        }
        let session = Self::mint_session(&mut state, ttl, now);
        state.next_lock += 1;
        let lock_id = LockId(state.next_lock);
        state.locks.insert(key, LockState { lock_id, session });
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
        let session = lock.session;
        state.locks.remove(&key);
        state.sessions.remove(&session);
        Ok(true)
    }

    fn put_ephemeral(&self, key: &str, value: &[u8], ttl: Duration) -> PlaneResult<SessionId> {
        let key = normalize_path(key)?;
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        let session = Self::mint_session(&mut state, ttl, now);
        let entry = Self::apply_put(&mut state, &key, value, 0, None, Some(session), now);
        self.watches.publish(&key, &WatchEvent::Put(entry));
        Ok(session)
    }

    fn terminate_session(&self, session: SessionId) -> PlaneResult<bool> {
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        self.sweep(&mut state, now);
        if state.sessions.remove(&session).is_none() {
            return Ok(false);
        }
        state.locks.retain(|_, lock| lock.session != session);
        for key in state.tree.keys_owned_by(session) {
            state.index += 1;
            let version = state.index;
            state.tree.remove(&key);
            self.watches.publish(&key, &WatchEvent::Delete(key.clone(), version));
        }
        Ok(true)
    }

    fn watch_prefix(&self, prefix: &str, handler: Arc<dyn WatchHandler>) -> PlaneResult<WatchHandle> {
        let prefix = normalize_path(prefix)?;
        Ok(self.watches.subscribe(&prefix, handler))
    }
}
