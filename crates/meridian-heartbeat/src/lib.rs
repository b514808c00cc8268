// SPDX-License-Identifier: Apache-2.0
//! Heartbeat ingestion and drift detection.
//!
//! The hot path of the control plane: instances report at high rate, and
//! every report must update instance state and compare the applied config
//! digest against the expected one with bounded latency and idempotent
//! writes.
//!
//! # Shape
//!
//! ```text
//! transport → HeartbeatQueue (bounded, rejects when full)
//!                  │
//!                  ▼
//!             batch loop (size/delay windows, latest-wins dedup)
//!                  │
//!                  ▼
//!        N workers × DriftPipeline::process_batch
//!                  │
//!        (instance bulk upsert, drift event insert/resolve)
//! ```
//!
//! One batch is handled to completion by one worker; batches never
//! straddle workers. Ordering per instance is guaranteed by latest-wins
//! dedup within a batch and `received_at` monotonicity across batches.
//! The periodic sweepers handle what heartbeats cannot: flipping silent
//! instances to `Unknown` and retiring expired shares.

mod batcher;
mod pipeline;
mod queue;
mod severity;
mod sweeper;
mod worker;

pub use batcher::{next_batch, Batch, BatcherConfig};
pub use pipeline::{BatchOutcome, DriftPipeline, ExpectedHashSource, FixedExpectedHashes};
pub use queue::HeartbeatQueue;
pub use severity::{EnvSeverityPolicy, SeverityPolicy};
pub use sweeper::{ExpiredShareSweeper, StaleInstanceSweeper};
pub use worker::{spawn_pipeline, PipelineHandle, WorkerConfig};
