// SPDX-License-Identifier: Apache-2.0
//! Deadline-bounded retry and fallback-cache layering over any backend.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use meridian_core::PlaneResult;
use meridian_resilience::{Clock, Deadline, FallbackCache, RetryPolicy};

use crate::entry::KvEntry;
use crate::store::{KvStore, LockId, PutOptions, PutOutcome, TxnOp};

/// A read that may have been served from the fallback cache.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CachedRead {
    /// The entry, when the key exists (or existed, for a stale read).
    pub entry: Option<KvEntry>,
    /// True when the backend was unreachable and the value is the cached
    /// last-known-good one. Stale absence is never reported — a miss with
    /// a dead backend is an error, not `None`.
    pub stale: bool,
}

/// Retry/fallback wrapper around a [`KvStore`].
///
/// Every method takes the caller's [`Deadline`] and checks it before each
/// attempt. Only backend-unavailable failures are retried; CAS misses and
/// validation failures pass straight through. Reads feed the fallback
/// cache; when the backend stays down past the retry schedule, the last
/// cached value is served flagged stale.
pub struct ResilientKv {
    inner: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    fallback: FallbackCache<String, KvEntry>,
}

impl ResilientKv {
    /// Wrap `inner` with the given retry schedule and a fallback cache of
    /// `cache_capacity` entries living `cache_ttl` each.
    #[must_use]
    pub fn new(
        inner: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            inner,
            clock,
            retry,
            fallback: FallbackCache::new("kv-read-fallback", cache_capacity, cache_ttl),
        }
    }

    /// Read one key, falling back to the cache when the backend is down.
    pub fn get(&self, key: &str, deadline: Deadline) -> PlaneResult<CachedRead> {
        let result = self
            .retry
            .run(self.clock.as_ref(), deadline, "kv.get", || self.inner.get(key));
        match result {
            Ok(entry) => {
                if let Some(entry) = &entry {
                    self.fallback.put(key.to_owned(), entry.clone(), self.clock.now());
                }
                Ok(CachedRead { entry, stale: false })
            }
            Err(err) if err.kind().is_retryable() => {
                match self.fallback.get(&key.to_owned(), self.clock.now()) {
                    Some(entry) => {
                        warn!(key, code = err.code(), "kv backend down; serving stale fallback");
                        Ok(CachedRead { entry: Some(entry), stale: true })
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Write one key with retries. Only reads feed the fallback cache —
    /// a write does not know the key's true create index.
    pub fn put(
        &self,
        key: &str,
        value: &[u8],
        options: PutOptions,
        deadline: Deadline,
    ) -> PlaneResult<PutOutcome> {
        self.retry.run(self.clock.as_ref(), deadline, "kv.put", || {
            self.inner.put(key, value, options)
        })
    }

    /// Delete one key with retries.
    pub fn delete(
        &self,
        key: &str,
        expected_index: Option<u64>,
        deadline: Deadline,
    ) -> PlaneResult<bool> {
        self.retry.run(self.clock.as_ref(), deadline, "kv.delete", || {
            self.inner.delete(key, expected_index)
        })
    }

    /// List a prefix with retries. Listings are not cached — there is no
    /// single last-known-good value to fall back to.
    pub fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        from_key: Option<&str>,
        deadline: Deadline,
    ) -> PlaneResult<Vec<KvEntry>> {
        self.retry.run(self.clock.as_ref(), deadline, "kv.list", || {
            self.inner.list(prefix, limit, from_key)
        })
    }

    /// Run a transaction with retries.
    pub fn txn(&self, ops: &[TxnOp], deadline: Deadline) -> PlaneResult<Vec<bool>> {
        self.retry
            .run(self.clock.as_ref(), deadline, "kv.txn", || self.inner.txn(ops))
    }

    /// Acquire a lock with retries on backend unavailability only; a held
    /// lock surfaces immediately as `Conflict`.
    pub fn acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
        deadline: Deadline,
    ) -> PlaneResult<LockId> {
        self.retry.run(self.clock.as_ref(), deadline, "kv.acquire_lock", || {
            self.inner.acquire_lock(key, ttl)
        })
    }

    /// Release a lock with retries.
    pub fn release_lock(&self, key: &str, lock_id: LockId, deadline: Deadline) -> PlaneResult<bool> {
        self.retry.run(self.clock.as_ref(), deadline, "kv.release_lock", || {
            self.inner.release_lock(key, lock_id)
        })
    }

    /// Explicit teardown of the fallback cache.
    pub fn clear_fallback(&self) {
        self.fallback.clear();
    }
}
