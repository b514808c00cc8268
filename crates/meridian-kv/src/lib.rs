// SPDX-License-Identifier: Apache-2.0
//! Uniform key-value abstraction for the authoritative config source.
//!
//! The plane stores per-service expected configuration in an external KV
//! store. This crate narrows two real-world stores down to one port:
//! [`KvStore`] offers compare-and-set writes, TTLs, lexicographic prefix
//! listing, all-or-nothing transactions, distributed locks with fencing,
//! ephemeral keys, and prefix watches.
//!
//! Two in-memory backends model the semantics of the stores they stand in
//! for: [`ConsulStore`] (one index per write, session-owned ephemera) and
//! [`EtcdStore`] (one revision per transaction, lease-owned ephemera).
//! Adapters for the real stores implement the same port at wiring time.
//!
//! [`ResilientKv`] layers deadline-bounded retry and a stale-flagged
//! fallback cache on top of any backend.

mod consul;
mod encoding;
mod entry;
mod etcd;
mod path;
mod resilient;
mod store;
mod tree;
mod watch;

pub use consul::ConsulStore;
pub use encoding::ValueEncoding;
pub use entry::KvEntry;
pub use etcd::EtcdStore;
pub use path::{normalize_path, KeyPolicy};
pub use resilient::{CachedRead, ResilientKv};
pub use store::{KvStore, LockId, PutOptions, PutOutcome, SessionId, TxnOp};
pub use watch::{WatchHandle, WatchHandler};
