// SPDX-License-Identifier: Apache-2.0
//! Periodic sweepers: staleness and share expiry.
//!
//! Both are idempotent and crash-safe: each pass recomputes its target
//! set from stored state, so a missed or repeated tick changes nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use meridian_core::{InstanceStatus, PlaneResult};
use meridian_resilience::Clock;
use meridian_store::{InstanceRepository, ShareRepository};

/// Flips silent instances to `Unknown` and purges long-gone ones.
pub struct StaleInstanceSweeper {
    instances: Arc<dyn InstanceRepository>,
    clock: Arc<dyn Clock>,
    staleness: chrono::Duration,
    purge_after: Option<chrono::Duration>,
}

impl StaleInstanceSweeper {
    /// A sweeper marking instances `Unknown` after `staleness` without a
    /// heartbeat, and deleting them entirely after `purge_after` (when
    /// set — purging is opt-in).
    #[must_use]
    pub fn new(
        instances: Arc<dyn InstanceRepository>,
        clock: Arc<dyn Clock>,
        staleness: Duration,
        purge_after: Option<Duration>,
    ) -> Self {
        Self {
            instances,
            clock,
            staleness: chrono::Duration::from_std(staleness)
                .unwrap_or_else(|_| chrono::Duration::seconds(120)),
            purge_after: purge_after
                .and_then(|duration| chrono::Duration::from_std(duration).ok()),
        }
    }

    /// One pass. Returns how many instances were flipped to `Unknown`.
    pub fn sweep_once(&self) -> PlaneResult<usize> {
        let now = self.clock.wall_now();
        let cutoff = now - self.staleness;
        let mut flipped = 0;
        for mut instance in self.instances.find_stale(cutoff)? {
            instance.status = InstanceStatus::Unknown;
            instance.updated_at = now;
            self.instances.save(instance)?;
            flipped += 1;
        }
        if let Some(purge_after) = self.purge_after {
            let purged = self.instances.delete_absent_since(now - purge_after)?;
            if purged > 0 {
                info!(purged, "purged instances absent past their retention");
            }
        }
        Ok(flipped)
    }

    /// Run until `shutdown` flips to true, sweeping every `interval`.
    #[instrument(skip_all)]
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.sweep_once() {
                    Ok(flipped) if flipped > 0 => info!(flipped, "instances marked unknown"),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "staleness sweep failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

/// Surfaces expired shares for audit; the evaluator already ignores them.
pub struct ExpiredShareSweeper {
    shares: Arc<dyn ShareRepository>,
    clock: Arc<dyn Clock>,
}

impl ExpiredShareSweeper {
    /// A sweeper over the share store.
    #[must_use]
    pub fn new(shares: Arc<dyn ShareRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { shares, clock }
    }

    /// One pass. Returns how many shares are currently expired.
    pub fn sweep_once(&self) -> PlaneResult<usize> {
        let expired = self.shares.find_expired(self.clock.wall_now())?;
        Ok(expired.len())
    }

    /// Run until `shutdown` flips to true, sweeping every `interval`.
    #[instrument(skip_all)]
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.sweep_once() {
                    Ok(expired) if expired > 0 => info!(expired, "expired shares on record"),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "share expiry sweep failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
