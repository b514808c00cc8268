// SPDX-License-Identifier: Apache-2.0
//! The KV port: one trait over both backends.

use std::sync::Arc;
use std::time::Duration;

use meridian_core::PlaneResult;

use crate::entry::KvEntry;
use crate::watch::{WatchHandle, WatchHandler};

/// Options for a single put.
#[derive(Clone, Copy, Debug, Default)]
pub struct PutOptions {
    /// Compare-and-set: write only when the current `modify_index` equals
    /// this. `None` writes unconditionally.
    pub expected_index: Option<u64>,
    /// Automatic deletion after this long.
    pub ttl: Option<Duration>,
    /// Opaque caller metadata persisted with the value.
    pub flags: u64,
}

impl PutOptions {
    /// Compare-and-set against `index`.
    #[must_use]
    pub fn cas(index: u64) -> Self {
        Self { expected_index: Some(index), ..Self::default() }
    }
}

/// Outcome of a put.
///
/// A CAS miss is an expected outcome, not an error: `success` is false and
/// `modify_index` reports the index that won. Callers surfacing the miss as
/// a precondition failure map it at their own layer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PutOutcome {
    /// Whether the write was applied.
    pub success: bool,
    /// The key's modify index after the call (the winner's on a CAS miss).
    pub modify_index: u64,
}

/// One operation inside a transaction.
#[derive(Clone, Debug)]
pub enum TxnOp {
    /// Write a value, optionally CAS-guarded and TTL-bounded.
    Put {
        /// Target key.
        key: String,
        /// Value bytes.
        value: Vec<u8>,
        /// CAS guard, as in [`PutOptions::expected_index`].
        expected_index: Option<u64>,
        /// TTL, as in [`PutOptions::ttl`].
        ttl: Option<Duration>,
    },
    /// Delete a key, optionally CAS-guarded.
    Delete {
        /// Target key.
        key: String,
        /// CAS guard.
        expected_index: Option<u64>,
    },
    /// Assert a key's current modify index without writing.
    ///
    /// `expected_index == 0` asserts absence.
    CheckIndex {
        /// Target key.
        key: String,
        /// Asserted index (0 = key must not exist).
        expected_index: u64,
    },
}

/// Fencing token for a held lock.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LockId(pub u64);

/// Identity of a session owning ephemeral keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SessionId(pub u64);

/// Uniform key-value port with CAS semantics.
///
/// All keys are expected to be pre-normalized via
/// [`normalize_path`](crate::normalize_path); backends re-validate and
/// reject anything else with `InvalidArgument`.
///
/// # Failure Semantics
///
/// - Unreachable backend → `BackendUnavailable` (retried by
///   [`ResilientKv`](crate::ResilientKv), never here).
/// - CAS miss → `success = false` outcome, never an error, never retried.
/// - Path validation failure → `InvalidArgument`, fatal for the call.
pub trait KvStore: Send + Sync {
    /// Read one key. Absence is `Ok(None)`, not an error.
    fn get(&self, key: &str) -> PlaneResult<Option<KvEntry>>;

    /// Write one key per `options`.
    fn put(&self, key: &str, value: &[u8], options: PutOptions) -> PlaneResult<PutOutcome>;

    /// Delete one key. Returns whether a live key was removed; a CAS miss
    /// returns `false` and removes nothing.
    fn delete(&self, key: &str, expected_index: Option<u64>) -> PlaneResult<bool>;

    /// List entries under `prefix` in ascending key order. `from_key` is an
    /// exclusive lower bound for keyset pagination.
    fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        from_key: Option<&str>,
    ) -> PlaneResult<Vec<KvEntry>>;

    /// Apply `ops` atomically. Per-op outcomes are returned in order; when
    /// any op fails, nothing is applied and the failing ops read `false`.
    fn txn(&self, ops: &[TxnOp]) -> PlaneResult<Vec<bool>>;

    /// Acquire the mutual-exclusion lock on `key` for `ttl`.
    ///
    /// # Errors
    ///
    /// `Conflict` with code `KV_LOCK_HELD` while another holder's TTL is
    /// still running.
    fn acquire_lock(&self, key: &str, ttl: Duration) -> PlaneResult<LockId>;

    /// Release a held lock. Returns `false` when `lock_id` is not the
    /// current holder (expired or fenced out) — the caller must treat its
    /// critical section as having been unprotected.
    fn release_lock(&self, key: &str, lock_id: LockId) -> PlaneResult<bool>;

    /// Write a key bound to a fresh session; the key vanishes when the
    /// session expires or is terminated.
    fn put_ephemeral(&self, key: &str, value: &[u8], ttl: Duration) -> PlaneResult<SessionId>;

    /// Terminate a session, removing every key it owns. Returns whether the
    /// session was live.
    fn terminate_session(&self, session: SessionId) -> PlaneResult<bool>;

    /// Stream mutations under `prefix` to `handler` until the returned
    /// handle is cancelled. Events are delivered in per-key order; no
    /// ordering is guaranteed across keys.
    fn watch_prefix(&self, prefix: &str, handler: Arc<dyn WatchHandler>) -> PlaneResult<WatchHandle>;
}
