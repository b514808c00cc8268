// SPDX-License-Identifier: Apache-2.0
//! The inbound heartbeat message.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use meridian_core::{codes, Heartbeat, InstanceId, PlaneError, PlaneResult};

const OP: &str = "heartbeat.parse";

/// Raw heartbeat body, as deserialized from the transport.
///
/// Bounds (violating any rejects the whole message):
///
/// | field | bound |
/// |---|---|
/// | `serviceName` | required, 1..=200 chars |
/// | `instanceId` | required, 1..=128 chars |
/// | `configHash` | 64 lowercase hex chars when present |
/// | `host` | ≤ 253 chars |
/// | `port` | 1..=65535 |
/// | `environment`, `version` | ≤ 64 chars |
/// | `metadata` | ≤ 64 pairs, keys ≤ 128 chars, values ≤ 512 chars |
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HeartbeatMessage {
    /// Display name of the reporting service.
    pub service_name: String,
    /// Reporting instance identity.
    pub instance_id: String,
    /// Digest of the applied configuration.
    #[serde(default)]
    pub config_hash: Option<String>,
    /// Reported host.
    #[serde(default)]
    pub host: Option<String>,
    /// Reported port.
    #[serde(default)]
    pub port: Option<u32>,
    /// Deployment environment.
    #[serde(default)]
    pub environment: Option<String>,
    /// Reported build/release version.
    #[serde(default)]
    pub version: Option<String>,
    /// Free-form report metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn invalid(message: impl Into<String>) -> PlaneError {
    PlaneError::invalid_argument(codes::WIRE_INVALID, OP, message)
}

fn check_len(field: &'static str, value: &str, max: usize) -> PlaneResult<()> {
    if value.chars().count() > max {
        return Err(invalid(format!("{field} exceeds {max} characters")));
    }
    Ok(())
}

fn is_lower_hex_64(raw: &str) -> bool {
    raw.len() == 64
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

impl HeartbeatMessage {
    /// Validate every bound and produce the pipeline-ready record.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` with code `WIRE_INVALID` on the first violated
    /// bound; nothing of a rejected message is salvaged.
    pub fn validate(self, received_at: DateTime<Utc>) -> PlaneResult<Heartbeat> {
        if self.service_name.is_empty() {
            return Err(invalid("serviceName is required"));
        }
        check_len("serviceName", &self.service_name, 200)?;
        if self.instance_id.is_empty() {
            return Err(invalid("instanceId is required"));
        }
        let instance_id = InstanceId::parse(self.instance_id.as_str())
            .map_err(|err| invalid(format!("instanceId: {}", err.message())))?;
        if let Some(hash) = &self.config_hash {
            if !is_lower_hex_64(hash) {
                return Err(invalid("configHash must be 64 lowercase hex characters"));
            }
        }
        if let Some(host) = &self.host {
            check_len("host", host, 253)?;
        }
        let port = match self.port {
            None => None,
            Some(port @ 1..=65535) => Some(u16::try_from(port).map_err(|_| invalid("port"))?),
            Some(port) => return Err(invalid(format!("port {port} is outside 1..=65535"))),
        };
        if let Some(environment) = &self.environment {
            check_len("environment", environment, 64)?;
        }
        if let Some(version) = &self.version {
            check_len("version", version, 64)?;
        }
        if self.metadata.len() > 64 {
            return Err(invalid("metadata exceeds 64 entries"));
        }
        for (key, value) in &self.metadata {
            check_len("metadata key", key, 128)?;
            check_len("metadata value", value, 512)?;
        }
        Ok(Heartbeat {
            service_name: self.service_name,
            instance_id,
            config_hash: self.config_hash,
            host: self.host,
            port,
            environment: self.environment,
            version: self.version,
            metadata: self.metadata,
            received_at,
        })
    }
}

/// Decode and validate one heartbeat body.
///
/// # Errors
///
/// `InvalidArgument` with code `WIRE_INVALID` for malformed JSON or any
/// violated bound.
pub fn parse_heartbeat(body: &[u8], received_at: DateTime<Utc>) -> PlaneResult<Heartbeat> {
    let message: HeartbeatMessage =
        serde_json::from_slice(body).map_err(|err| invalid(format!("malformed body: {err}")))?;
    message.validate(received_at)
}
