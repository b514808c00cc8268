// SPDX-License-Identifier: Apache-2.0
//! The ingestion loop and its worker pool.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use meridian_core::Heartbeat;

use crate::batcher::{next_batch, Batch, BatcherConfig};
use crate::pipeline::DriftPipeline;
use crate::queue::HeartbeatQueue;

/// Sizing of the ingestion stage.
#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    /// Capacity of the inbound heartbeat queue.
    pub queue_capacity: usize,
    /// Batch processors. Each batch is handled entirely by one of them.
    pub workers: usize,
    /// Window bounds for the batch loop.
    pub batcher: BatcherConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { queue_capacity: 4096, workers: 4, batcher: BatcherConfig::default() }
    }
}

/// Running pipeline tasks. Awaiting [`join`](Self::join) after every
/// producer handle is dropped drains the queue and stops cleanly.
pub struct PipelineHandle {
    batcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Wait for the batch loop and all workers to finish.
    pub async fn join(self) {
        if self.batcher.await.is_err() {
            error!("batch loop task failed");
        }
        for worker in self.workers {
            if worker.await.is_err() {
                error!("pipeline worker task failed");
            }
        }
    }
}

/// Spawn the single-consumer batch loop plus `workers` batch processors.
///
/// The returned [`HeartbeatQueue`] is the producer handle; clone it into
/// every transport adapter. When the last clone is dropped, the loop
/// drains remaining heartbeats, emits the final batch, and winds down.
#[must_use]
pub fn spawn_pipeline(
    pipeline: Arc<DriftPipeline>,
    config: WorkerConfig,
) -> (HeartbeatQueue, PipelineHandle) {
    let (queue, receiver) = HeartbeatQueue::bounded(config.queue_capacity);
    let worker_count = config.workers.max(1);

    let (batch_tx, batch_rx) = mpsc::channel::<Batch>(worker_count * 2);
    let batch_rx = Arc::new(Mutex::new(batch_rx));

    let batcher = tokio::spawn(batch_loop(receiver, batch_tx, config.batcher));
    let workers = (0..worker_count)
        .map(|index| {
            let pipeline = Arc::clone(&pipeline);
            let batch_rx = Arc::clone(&batch_rx);
            tokio::spawn(worker_loop(index, pipeline, batch_rx))
        })
        .collect();

    info!(workers = worker_count, queue = config.queue_capacity, "heartbeat pipeline started");
    (queue, PipelineHandle { batcher, workers })
}

#[instrument(skip_all)]
async fn batch_loop(
    mut receiver: mpsc::Receiver<Heartbeat>,
    batches: mpsc::Sender<Batch>,
    config: BatcherConfig,
) {
    while let Some(batch) = next_batch(&mut receiver, config).await {
        if batches.send(batch).await.is_err() {
            // Every worker is gone; nothing left to feed.
            return;
        }
    }
    info!("heartbeat queue closed; batch loop stopping");
}

#[instrument(skip(pipeline, batches))]
async fn worker_loop(
    index: usize,
    pipeline: Arc<DriftPipeline>,
    batches: Arc<Mutex<mpsc::Receiver<Batch>>>,
) {
    loop {
        // Lock only to dequeue; the batch itself is processed outside the
        // lock so workers run in parallel. FIFO order comes from the
        // channel, fairness from the mutex queue.
        let batch = { batches.lock().await.recv().await };
        let Some(batch) = batch else {
            return;
        };
        match pipeline.process_batch(batch) {
            Ok(outcome) => {
                if outcome.drift_opened > 0 || outcome.drift_resolved > 0 {
                    info!(
                        worker = index,
                        opened = outcome.drift_opened,
                        resolved = outcome.drift_resolved,
                        "drift state changed"
                    );
                }
            }
            Err(err) => {
                // A failed batch is logged and dropped; heartbeats are
                // periodic, so the next report repairs the state.
                error!(worker = index, error = %err, "batch processing failed");
            }
        }
    }
}
