// SPDX-License-Identifier: Apache-2.0
//! Settings service and storage port for the Meridian daemon.
//!
//! A thin layer in two halves: [`SettingsStore`] is the raw-blob port
//! (filesystem in [`FsSettingsStore`], anything at wiring time), and
//! [`Settings`] is the typed document with a serde default for every
//! recognized option. Unknown fields are rejected — a typo in a settings
//! file should fail loudly at startup, not silently fall back.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Key not present in the store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Storage port for raw settings blobs (keyed by logical name).
pub trait SettingsStore {
    /// Load a raw blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, SettingsError>;
    /// Persist a raw blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), SettingsError>;
}

/// Store settings as JSON files, either under the platform config
/// directory or at an explicit base path.
pub struct FsSettingsStore {
    base: PathBuf,
}

impl FsSettingsStore {
    /// A store rooted at the user config directory (e.g. `~/.config/meridian`).
    pub fn new() -> Result<Self, SettingsError> {
        let proj = ProjectDirs::from("dev", "meridian", "meridian")
            .ok_or_else(|| SettingsError::Other("could not resolve config dir".into()))?;
        let base = proj.config_dir().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// A store rooted at an explicit directory (daemon `--config-dir`).
    pub fn at(base: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl SettingsStore for FsSettingsStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, SettingsError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(SettingsError::NotFound),
            Err(err) => Err(SettingsError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), SettingsError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

/// Which KV backend the daemon talks to.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvBackendKind {
    /// Consul-like semantics (per-write index, sessions).
    #[default]
    Consul,
    /// etcd-like semantics (per-txn revision, leases).
    Etcd,
}

/// Heartbeat ingestion options.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct HeartbeatSettings {
    /// Close a batch window after this many messages.
    pub batch_max_size: usize,
    /// Close a batch window after this many milliseconds.
    pub batch_max_delay_ms: u64,
    /// Flip an instance to `UNKNOWN` after this long without a report.
    pub instance_staleness_ms: u64,
    /// Purge an instance record after this long without a report.
    /// `null` disables purging.
    pub instance_purge_ms: Option<u64>,
    /// Batch processor count.
    pub workers: usize,
    /// Capacity of the bounded ingestion queue.
    pub queue_capacity: usize,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            batch_max_size: 500,
            batch_max_delay_ms: 200,
            instance_staleness_ms: 120_000,
            instance_purge_ms: Some(604_800_000),
            workers: 4,
            queue_capacity: 4096,
        }
    }
}

/// KV client options.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct KvSettings {
    /// Which backend semantics to run.
    pub backend: KvBackendKind,
    /// Connect budget per call, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read budget per call, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for KvSettings {
    fn default() -> Self {
        Self { backend: KvBackendKind::Consul, connect_timeout_ms: 2000, read_timeout_ms: 5000 }
    }
}

/// Resilience options.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ResilienceSettings {
    /// Per-entry TTL of the read fallback cache, in milliseconds.
    pub fallback_cache_ttl_ms: u64,
    /// Bound of the read fallback cache, in entries.
    pub fallback_cache_capacity: usize,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self { fallback_cache_ttl_ms: 300_000, fallback_cache_capacity: 4096 }
    }
}

/// Approval workflow options.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ApprovalSettings {
    /// Optimistic-concurrency retry bound for state transitions.
    pub max_retries: u32,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

/// Drift severity options.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SeveritySettings {
    /// Environments whose drift is `CRITICAL`.
    pub production_envs: Vec<String>,
}

impl Default for SeveritySettings {
    fn default() -> Self {
        Self { production_envs: vec!["prod".to_owned(), "production".to_owned()] }
    }
}

/// The full daemon settings document.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Settings {
    /// Heartbeat ingestion.
    pub heartbeat: HeartbeatSettings,
    /// KV client.
    pub kv: KvSettings,
    /// Retry and fallback caching.
    pub resilience: ResilienceSettings,
    /// Approval workflow.
    pub approval: ApprovalSettings,
    /// Drift severity derivation.
    pub severity: SeveritySettings,
}

/// Key under which the daemon settings document lives.
pub const SETTINGS_KEY: &str = "planed";

/// Thin service that serializes settings and delegates storage.
pub struct SettingsService<S> {
    store: S,
}

impl<S> SettingsService<S>
where
    S: SettingsStore,
{
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load the settings document; absent means all defaults.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        match self.store.load_raw(SETTINGS_KEY) {
            Ok(bytes) if bytes.is_empty() => Ok(Settings::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(SettingsError::NotFound) => Ok(Settings::default()),
            Err(err) => Err(err),
        }
    }

    /// Serialize and persist the settings document.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let data = serde_json::to_vec_pretty(settings)?;
        self.store.save_raw(SETTINGS_KEY, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl SettingsStore for MapStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, SettingsError> {
            self.blobs
                .lock()
                .map_err(|_| SettingsError::Other("poisoned".into()))?
                .get(key)
                .cloned()
                .ok_or(SettingsError::NotFound)
        }

        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), SettingsError> {
            self.blobs
                .lock()
                .map_err(|_| SettingsError::Other("poisoned".into()))?
                .insert(key.to_owned(), data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.heartbeat.batch_max_size, 500);
        assert_eq!(settings.heartbeat.batch_max_delay_ms, 200);
        assert_eq!(settings.heartbeat.instance_staleness_ms, 120_000);
        assert_eq!(settings.approval.max_retries, 5);
        assert_eq!(settings.kv.backend, KvBackendKind::Consul);
        assert_eq!(settings.kv.connect_timeout_ms, 2000);
        assert_eq!(settings.kv.read_timeout_ms, 5000);
        assert_eq!(settings.resilience.fallback_cache_ttl_ms, 300_000);
        assert_eq!(settings.severity.production_envs, ["prod", "production"]);
    }

    #[test]
    fn missing_document_loads_defaults_and_round_trips() {
        let service = SettingsService::new(MapStore::default());
        assert_eq!(service.load().unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.kv.backend = KvBackendKind::Etcd;
        settings.heartbeat.workers = 8;
        service.save(&settings).unwrap();
        assert_eq!(service.load().unwrap(), settings);
    }

    #[test]
    fn unknown_fields_fail_loudly() {
        let store = MapStore::default();
        store
            .save_raw(SETTINGS_KEY, br#"{"heartbeat": {"batchMaxSizes": 10}}"#)
            .unwrap();
        let service = SettingsService::new(store);
        assert!(service.load().is_err());
    }

    #[test]
    fn partial_documents_keep_defaults_elsewhere() {
        let store = MapStore::default();
        store
            .save_raw(SETTINGS_KEY, br#"{"kv": {"backend": "etcd"}}"#)
            .unwrap();
        let service = SettingsService::new(store);
        let settings = service.load().unwrap();
        assert_eq!(settings.kv.backend, KvBackendKind::Etcd);
        assert_eq!(settings.kv.connect_timeout_ms, 2000);
        assert_eq!(settings.heartbeat.batch_max_size, 500);
    }
}
