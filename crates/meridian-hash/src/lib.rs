// SPDX-License-Identifier: Apache-2.0
//! Canonical configuration snapshot and digest.
//!
//! The plane and every instance must agree byte-for-byte on what a service's
//! effective configuration *is* before they can compare digests of it. This
//! crate owns that agreement: it folds prioritized property sources into a
//! canonical snapshot, filters out keys that must never influence the digest
//! (secrets and per-process ephemera), renders a canonical string, and
//! hashes it with SHA-256.
//!
//! # Determinism Invariants
//!
//! - The digest is independent of the iteration order of the underlying
//!   containers: properties are folded into a sorted map before rendering.
//! - Values are carried in their source text form — no boolean or number
//!   re-formatting between collection and rendering.
//! - A `None` header field is omitted entirely; `key=null` is never emitted.
//! - Removing a filtered key never changes the digest; changing a
//!   non-filtered key always does.

mod digest;
mod filter;
mod snapshot;
mod source;

pub use digest::sha256_hex;
pub use filter::is_filtered_key;
pub use snapshot::{ConfigSnapshot, SnapshotBuilder};
pub use source::{PropertyOrigin, PropertySource};
