// SPDX-License-Identifier: Apache-2.0
//! Shared in-memory record tree used by both backends.
//!
//! The tree is semantics-free storage: a sorted map of records with
//! per-record expiry and helpers for prefix listing and transaction
//! precondition checks. Index/revision assignment — where the two
//! backends genuinely differ — stays with the backend.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Instant;

use crate::entry::KvEntry;
use crate::store::{SessionId, TxnOp};

/// Rebuild a transaction's ops with validated, normalized keys.
pub(crate) fn normalize_ops(ops: &[TxnOp]) -> meridian_core::PlaneResult<Vec<TxnOp>> {
    use crate::path::normalize_path;
    ops.iter()
        .map(|op| {
            Ok(match op {
                TxnOp::Put { key, value, expected_index, ttl } => TxnOp::Put {
                    key: normalize_path(key)?,
                    value: value.clone(),
                    expected_index: *expected_index,
                    ttl: *ttl,
                },
                TxnOp::Delete { key, expected_index } => TxnOp::Delete {
                    key: normalize_path(key)?,
                    expected_index: *expected_index,
                },
                TxnOp::CheckIndex { key, expected_index } => TxnOp::CheckIndex {
                    key: normalize_path(key)?,
                    expected_index: *expected_index,
                },
            })
        })
        .collect()
}

/// One stored record.
#[derive(Clone, Debug)]
pub(crate) struct Record {
    pub value: Vec<u8>,
    pub create_index: u64,
    pub modify_index: u64,
    pub flags: u64,
    pub expires_at: Option<Instant>,
    /// Session/lease that owns this key, for ephemeral records.
    pub owner: Option<SessionId>,
}

impl Record {
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub(crate) fn to_entry(&self, key: &str) -> KvEntry {
        KvEntry {
            key: key.to_owned(),
            value: self.value.clone(),
            create_index: self.create_index,
            modify_index: self.modify_index,
            flags: self.flags,
        }
    }
}

/// Sorted record storage.
#[derive(Default)]
pub(crate) struct Tree {
    records: BTreeMap<String, Record>,
}

impl Tree {
    /// A live record, ignoring ones whose TTL has lapsed but which have not
    /// been swept yet.
    pub(crate) fn get_live(&self, key: &str, now: Instant) -> Option<&Record> {
        self.records.get(key).filter(|record| !record.is_expired(now))
    }

    pub(crate) fn insert(&mut self, key: String, record: Record) {
        self.records.insert(key, record);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Record> {
        self.records.remove(key)
    }

    /// The current modify index of a key; 0 when absent. This is the value
    /// CAS guards compare against (0 = "must not exist").
    pub(crate) fn current_index(&self, key: &str, now: Instant) -> u64 {
        self.get_live(key, now).map_or(0, |record| record.modify_index)
    }

    /// Whether `key` sits in the subtree rooted at the normalized
    /// `prefix`. Segment-aware: `services/billing` does not cover
    /// `services/billing2/...`.
    pub(crate) fn in_subtree(prefix: &str, key: &str) -> bool {
        key == prefix
            || (key.len() > prefix.len()
                && key.starts_with(prefix)
                && key.as_bytes()[prefix.len()] == b'/')
    }

    /// Live entries in the subtree of `prefix` in ascending key order,
    /// `from_key` exclusive, capped at `limit`.
    pub(crate) fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        from_key: Option<&str>,
        now: Instant,
    ) -> Vec<KvEntry> {
        let lower = match from_key {
            Some(from) => Bound::Excluded(from.to_owned()),
            None => Bound::Unbounded,
        };
        self.records
            .range((lower, Bound::Unbounded))
            .filter(|(key, _)| Self::in_subtree(prefix, key))
            .filter(|(_, record)| !record.is_expired(now))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, record)| record.to_entry(key))
            .collect()
    }

    /// Keys whose TTL lapsed at or before `now`, in key order.
    pub(crate) fn expired_keys(&self, now: Instant) -> Vec<String> {
        self.records
            .iter()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Keys owned by `session`, in key order.
    pub(crate) fn keys_owned_by(&self, session: SessionId) -> Vec<String> {
        self.records
            .iter()
            .filter(|(_, record)| record.owner == Some(session))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Evaluate every transaction precondition against the current state.
    ///
    /// Returns one bool per op. The transaction may be applied only when
    /// all are true — all-or-nothing is the caller's contract.
    pub(crate) fn check_txn(&self, ops: &[TxnOp], now: Instant) -> Vec<bool> {
        ops.iter()
            .map(|op| match op {
                TxnOp::Put { key, expected_index, .. }
                | TxnOp::Delete { key, expected_index } => expected_index
                    .is_none_or(|expected| self.current_index(key, now) == expected),
                TxnOp::CheckIndex { key, expected_index } => {
                    self.current_index(key, now) == *expected_index
                }
            })
            .collect()
    }
}
