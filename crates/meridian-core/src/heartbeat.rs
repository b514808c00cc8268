// SPDX-License-Identifier: Apache-2.0
//! The validated heartbeat record fed into the ingestion pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ident::InstanceId;

/// One instance report, already shape-validated by the transport layer.
///
/// `received_at` is stamped at ingestion and is authoritative for ordering:
/// within a batch only the latest report per instance survives, and across
/// batches a report older than the stored `last_seen_at` is dropped.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Display name of the reporting service.
    pub service_name: String,
    /// The reporting instance.
    pub instance_id: InstanceId,
    /// Digest of the configuration the instance actually applied.
    pub config_hash: Option<String>,
    /// Reported host.
    pub host: Option<String>,
    /// Reported port.
    pub port: Option<u16>,
    /// Deployment environment.
    pub environment: Option<String>,
    /// Reported build/release version.
    pub version: Option<String>,
    /// Free-form report metadata.
    pub metadata: BTreeMap<String, String>,
    /// Ingestion instant, stamped by the transport adapter.
    pub received_at: DateTime<Utc>,
}
