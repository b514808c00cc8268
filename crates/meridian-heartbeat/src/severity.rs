// SPDX-License-Identifier: Apache-2.0
//! Drift severity derivation.

use std::collections::BTreeSet;

use meridian_core::{ApplicationService, DriftSeverity};

/// Policy deciding how loud a drift event is.
///
/// Pluggable so deployments can weigh environments differently; the
/// default covers the common case and honors per-service tag overrides.
pub trait SeverityPolicy: Send + Sync {
    /// Severity for drift of `service` in `environment`.
    fn derive(&self, service: &ApplicationService, environment: Option<&str>) -> DriftSeverity;
}

/// Environment-based default policy.
///
/// Production environments are `Critical`, staging `High`, everything
/// else `Medium`. A service tag `drift.severity` naming a valid severity
/// overrides the derivation outright.
#[derive(Clone, Debug)]
pub struct EnvSeverityPolicy {
    production_envs: BTreeSet<String>,
    staging_envs: BTreeSet<String>,
}

impl EnvSeverityPolicy {
    /// A policy treating `production_envs` as production. Staging is
    /// recognized by the conventional names `staging` and `stage`.
    #[must_use]
    pub fn new(production_envs: impl IntoIterator<Item = String>) -> Self {
        Self {
            production_envs: production_envs.into_iter().collect(),
            staging_envs: ["staging".to_owned(), "stage".to_owned()].into_iter().collect(),
        }
    }
}

impl Default for EnvSeverityPolicy {
    fn default() -> Self {
        Self::new(["prod".to_owned(), "production".to_owned()])
    }
}

impl SeverityPolicy for EnvSeverityPolicy {
    fn derive(&self, service: &ApplicationService, environment: Option<&str>) -> DriftSeverity {
        if let Some(tag) = service.severity_override() {
            if let Some(severity) = DriftSeverity::from_tag(tag) {
                return severity;
            }
        }
        match environment {
            Some(env) if self.production_envs.contains(env) => DriftSeverity::Critical,
            Some(env) if self.staging_envs.contains(env) => DriftSeverity::High,
            _ => DriftSeverity::Medium,
        }
    }
}
