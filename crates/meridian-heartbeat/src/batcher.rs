// SPDX-License-Identifier: Apache-2.0
//! Windowing heartbeats into batches.

use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::time::timeout;

use meridian_core::{Heartbeat, InstanceId};

/// Window bounds for the batch loop.
#[derive(Clone, Copy, Debug)]
pub struct BatcherConfig {
    /// Close the window after this many messages.
    pub max_batch_size: usize,
    /// Close the window after this much wall time, full or not.
    pub max_batch_delay: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self { max_batch_size: 500, max_batch_delay: Duration::from_millis(200) }
    }
}

/// One deduplicated window of heartbeats.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    /// Latest heartbeat per instance, in arbitrary order.
    pub heartbeats: Vec<Heartbeat>,
    /// Heartbeats dropped by latest-wins dedup within this window.
    pub duplicates_dropped: usize,
}

/// Collect the next batch from the queue.
///
/// Blocks until at least one heartbeat arrives, then keeps reading until
/// either `max_batch_size` messages have been absorbed or
/// `max_batch_delay` has elapsed since the first one — whichever comes
/// first. Within the window, only the latest report per `instance_id` (by
/// `received_at`) survives; the rest are counted, not processed.
///
/// Returns `None` once the queue is closed and drained — the loop's
/// shutdown signal.
pub async fn next_batch(
    receiver: &mut mpsc::Receiver<Heartbeat>,
    config: BatcherConfig,
) -> Option<Batch> {
    let first = receiver.recv().await?;
    let max_size = config.max_batch_size.max(1);

    let mut latest: FxHashMap<InstanceId, Heartbeat> = FxHashMap::default();
    let mut absorbed = 1_usize;
    let mut dropped = 0_usize;
    absorb(&mut latest, &mut dropped, first);

    let window = tokio::time::Instant::now() + config.max_batch_delay;
    while absorbed < max_size {
        let remaining = window.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, receiver.recv()).await {
            Ok(Some(heartbeat)) => {
                absorbed += 1;
                absorb(&mut latest, &mut dropped, heartbeat);
            }
            // Queue closed: emit what we have; the next call returns None.
            Ok(None) => break,
            // Window elapsed.
            Err(_) => break,
        }
    }

    Some(Batch {
        heartbeats: latest.into_values().collect(),
        duplicates_dropped: dropped,
    })
}

fn absorb(
    latest: &mut FxHashMap<InstanceId, Heartbeat>,
    dropped: &mut usize,
    heartbeat: Heartbeat,
) {
    use std::collections::hash_map::Entry;
    match latest.entry(heartbeat.instance_id.clone()) {
        Entry::Vacant(slot) => {
            slot.insert(heartbeat);
        }
        Entry::Occupied(mut slot) => {
            *dropped += 1;
            if heartbeat.received_at >= slot.get().received_at {
                slot.insert(heartbeat);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn heartbeat(instance: &str, at_secs: i64) -> Heartbeat {
        Heartbeat {
            service_name: "svc".into(),
            instance_id: InstanceId::parse(instance).unwrap(),
            config_hash: None,
            host: None,
            port: None,
            environment: None,
            version: None,
            metadata: BTreeMap::new(),
            received_at: Utc.timestamp_opt(1_700_000_000 + at_secs, 0).single().unwrap(),
        }
    }

    #[tokio::test]
    async fn closes_on_size_before_delay() {
        let (tx, mut rx) = mpsc::channel(16);
        for i in 0..5 {
            tx.send(heartbeat(&format!("i-{i}"), i)).await.unwrap();
        }
        let config = BatcherConfig { max_batch_size: 3, max_batch_delay: Duration::from_secs(60) };
        let batch = next_batch(&mut rx, config).await.unwrap();
        assert_eq!(batch.heartbeats.len(), 3);
        assert_eq!(batch.duplicates_dropped, 0);
        // The remaining two are the next window.
        let batch = next_batch(&mut rx, config).await.unwrap();
        assert_eq!(batch.heartbeats.len(), 2);
    }

    #[tokio::test]
    async fn closes_on_delay_when_underfull() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(heartbeat("i-1", 0)).await.unwrap();
        let config = BatcherConfig {
            max_batch_size: 100,
            max_batch_delay: Duration::from_millis(30),
        };
        let batch = next_batch(&mut rx, config).await.unwrap();
        assert_eq!(batch.heartbeats.len(), 1);
    }

    #[tokio::test]
    async fn latest_wins_within_the_window() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(heartbeat("i-1", 10)).await.unwrap();
        tx.send(heartbeat("i-1", 30)).await.unwrap();
        // Arrives later but timestamped earlier: dropped.
        tx.send(heartbeat("i-1", 20)).await.unwrap();
        let config = BatcherConfig { max_batch_size: 3, max_batch_delay: Duration::from_secs(60) };
        let batch = next_batch(&mut rx, config).await.unwrap();
        assert_eq!(batch.heartbeats.len(), 1);
        assert_eq!(batch.duplicates_dropped, 2);
        assert_eq!(
            batch.heartbeats[0].received_at,
            heartbeat("i-1", 30).received_at
        );
    }

    #[tokio::test]
    async fn closed_queue_ends_the_stream() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(heartbeat("i-1", 0)).await.unwrap();
        drop(tx);
        let config = BatcherConfig::default();
        assert!(next_batch(&mut rx, config).await.is_some());
        assert!(next_batch(&mut rx, config).await.is_none());
    }
}
