// SPDX-License-Identifier: Apache-2.0
//! The Meridian control-plane daemon.
//!
//! Wires settings → backends → repositories → evaluators → pipeline and
//! runs until interrupted. Transports (queue consumers, HTTP binding) are
//! deployment concerns that plug into the [`HeartbeatQueue`] and engine
//! handles this binary exposes; the daemon itself stays transport-free.

mod expected;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use meridian_approvals::ApprovalEngine;
use meridian_authz::AuthzEvaluator;
use meridian_heartbeat::{
    spawn_pipeline, BatcherConfig, DriftPipeline, EnvSeverityPolicy, ExpiredShareSweeper,
    HeartbeatQueue, PipelineHandle, StaleInstanceSweeper, WorkerConfig,
};
use meridian_kv::{ConsulStore, EtcdStore, KeyPolicy, KvStore, ResilientKv};
use meridian_resilience::{Clock, RetryPolicy, SystemClock};
use meridian_settings::{FsSettingsStore, KvBackendKind, Settings, SettingsService};
use meridian_store::{
    ApprovalRepository, DriftRepository, InstanceRepository, MemoryApprovalRepo, MemoryDriftRepo,
    MemoryInstanceRepo, MemoryServiceRepo, MemoryShareRepo, ServiceRepository, ShareRepository,
};

use crate::expected::KvExpectedHashes;

/// Everything the daemon runs: engines for the operator surface, the
/// queue handle for transports, and the background tasks.
struct Plane {
    queue: HeartbeatQueue,
    pipeline: PipelineHandle,
    sweepers: Vec<tokio::task::JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    // Held so transports wired in later can reach them.
    #[allow(dead_code)]
    approvals: Arc<ApprovalEngine>,
    #[allow(dead_code)]
    authz: Arc<AuthzEvaluator>,
}

fn load_settings() -> Result<Settings> {
    let store = match std::env::var_os("MERIDIAN_CONFIG_DIR") {
        Some(dir) => FsSettingsStore::at(std::path::PathBuf::from(dir)),
        None => FsSettingsStore::new(),
    }
    .context("resolving settings store")?;
    SettingsService::new(store).load().context("loading settings")
}

fn build_kv(settings: &Settings, clock: &Arc<dyn Clock>) -> Arc<ResilientKv> {
    let backend: Arc<dyn KvStore> = match settings.kv.backend {
        KvBackendKind::Consul => Arc::new(ConsulStore::new(Arc::clone(clock))),
        KvBackendKind::Etcd => Arc::new(EtcdStore::new(Arc::clone(clock))),
    };
    Arc::new(ResilientKv::new(
        backend,
        Arc::clone(clock),
        RetryPolicy::default(),
        settings.resilience.fallback_cache_capacity,
        Duration::from_millis(settings.resilience.fallback_cache_ttl_ms),
    ))
}

fn start(settings: &Settings) -> Plane {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let services = Arc::new(MemoryServiceRepo::new());
    let instances = Arc::new(MemoryInstanceRepo::new());
    let drift = Arc::new(MemoryDriftRepo::new());
    let shares = Arc::new(MemoryShareRepo::new());
    let approvals_repo = Arc::new(MemoryApprovalRepo::new());

    let kv = build_kv(settings, &clock);
    let expected = Arc::new(KvExpectedHashes::new(
        Arc::clone(&kv),
        KeyPolicy::default(),
        Arc::clone(&clock),
        Duration::from_millis(settings.kv.read_timeout_ms),
    ));

    let authz = Arc::new(AuthzEvaluator::new(
        Arc::clone(&services) as Arc<dyn ServiceRepository>,
        Arc::clone(&shares) as Arc<dyn ShareRepository>,
        Arc::clone(&clock),
    ));
    let approvals = Arc::new(ApprovalEngine::new(
        Arc::clone(&approvals_repo) as Arc<dyn ApprovalRepository>,
        Arc::clone(&services) as Arc<dyn ServiceRepository>,
        Arc::clone(&instances) as Arc<dyn InstanceRepository>,
        Arc::clone(&drift) as Arc<dyn DriftRepository>,
        Arc::clone(&authz),
        Arc::clone(&clock),
        settings.approval.max_retries,
    ));

    let pipeline = Arc::new(DriftPipeline::new(
        Arc::clone(&services) as Arc<dyn ServiceRepository>,
        Arc::clone(&instances) as Arc<dyn InstanceRepository>,
        Arc::clone(&drift) as Arc<dyn DriftRepository>,
        expected,
        Arc::new(EnvSeverityPolicy::new(settings.severity.production_envs.iter().cloned())),
        Arc::clone(&clock),
    ));
    let worker_config = WorkerConfig {
        queue_capacity: settings.heartbeat.queue_capacity,
        workers: settings.heartbeat.workers,
        batcher: BatcherConfig {
            max_batch_size: settings.heartbeat.batch_max_size,
            max_batch_delay: Duration::from_millis(settings.heartbeat.batch_max_delay_ms),
        },
    };
    let (queue, pipeline) = spawn_pipeline(pipeline, worker_config);

    let (shutdown, shutdown_rx) = watch::channel(false);
    let staleness = Duration::from_millis(settings.heartbeat.instance_staleness_ms);
    let stale_sweeper = StaleInstanceSweeper::new(
        Arc::clone(&instances) as Arc<dyn InstanceRepository>,
        Arc::clone(&clock),
        staleness,
        settings.heartbeat.instance_purge_ms.map(Duration::from_millis),
    );
    let share_sweeper = ExpiredShareSweeper::new(
        Arc::clone(&shares) as Arc<dyn ShareRepository>,
        Arc::clone(&clock),
    );
    let sweepers = vec![
        tokio::spawn(stale_sweeper.run(staleness / 2, shutdown_rx.clone())),
        tokio::spawn(share_sweeper.run(Duration::from_secs(60), shutdown_rx)),
    ];

    Plane { queue, pipeline, sweepers, shutdown, approvals, authz }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings()?;
    info!(backend = ?settings.kv.backend, workers = settings.heartbeat.workers, "starting meridian-planed");

    let plane = start(&settings);
    info!("control plane ready; waiting for interrupt");

    tokio::signal::ctrl_c().await.context("waiting for interrupt")?;
    info!("interrupt received; shutting down");

    // Order matters: stop producers, drain the pipeline, stop sweepers.
    let Plane { queue, pipeline, sweepers, shutdown, .. } = plane;
    drop(queue);
    pipeline.join().await;
    let _ = shutdown.send(true);
    for sweeper in sweepers {
        let _ = sweeper.await;
    }
    info!("shutdown complete");
    Ok(())
}
