// SPDX-License-Identifier: Apache-2.0
//! KV-backed expected-hash source.
//!
//! The authoritative configuration of a service lives under its KV
//! subtree. This adapter lists that subtree, folds it into the canonical
//! snapshot, and hands the pipeline the digest instances are expected to
//! report.

use std::sync::Arc;
use std::time::Duration;

use meridian_core::{ApplicationService, PlaneResult};
use meridian_hash::{PropertyOrigin, PropertySource, SnapshotBuilder};
use meridian_heartbeat::ExpectedHashSource;
use meridian_kv::{KeyPolicy, ResilientKv};
use meridian_resilience::{Clock, Deadline};

/// Reads per-service config from KV and digests it canonically.
pub struct KvExpectedHashes {
    kv: Arc<ResilientKv>,
    policy: KeyPolicy,
    clock: Arc<dyn Clock>,
    read_budget: Duration,
}

impl KvExpectedHashes {
    /// An adapter reading through `kv` with `read_budget` per lookup.
    pub fn new(
        kv: Arc<ResilientKv>,
        policy: KeyPolicy,
        clock: Arc<dyn Clock>,
        read_budget: Duration,
    ) -> Self {
        Self { kv, policy, clock, read_budget }
    }
}

impl ExpectedHashSource for KvExpectedHashes {
    fn expected_hash(
        &self,
        service: &ApplicationService,
        environment: Option<&str>,
    ) -> PlaneResult<Option<String>> {
        let prefix = self.policy.service_prefix(&service.id);
        let deadline = Deadline::after(self.clock.now(), self.read_budget);
        let entries = self.kv.list(prefix.trim_end_matches('/'), None, None, deadline)?;
        if entries.is_empty() {
            return Ok(None);
        }
        let properties: Vec<(String, String)> = entries
            .iter()
            .filter_map(|entry| {
                let relative = self.policy.extract_relative_path(&service.id, &entry.key)?;
                let value = entry.value_utf8()?.to_owned();
                Some((relative.replace('/', "."), value))
            })
            .collect();
        let source = PropertySource::new(
            format!("kv:{prefix}"),
            PropertyOrigin::Central,
            properties,
        );
        let mut builder = SnapshotBuilder::new().application(service.display_name.clone());
        if let Some(environment) = environment {
            builder = builder.profile(environment.to_owned());
        }
        Ok(Some(builder.source(&source).build().digest()))
    }
}
