pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod router;
pub mod scheduler;
pub mod state;
pub mod watchdog;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tokio::sync::watch;
use tracing::info;

use crate::auth::AuthTokenCache;
use crate::cache::RedisCacheClient;
use crate::config::Config;
use crate::executor::http::HttpExecutor;
use crate::executor::memory::MemoryExecutor;
use crate::executor::websocket::WebSocketExecutor;
use crate::orchestrator::KubeOrchestrator;
use crate::router::ResultRouter;
use crate::scheduler::{index_probes, Scheduler};
use crate::state::TaskStateTable;
use crate::watchdog::Watchdog;

/// Wires every component together and runs the agent until the shutdown
/// signal fires. Mirrors `cmd/main.go`'s construction order: configuration,
/// authentication, exporter, cluster client, watchdog, healthcheck manager,
/// API router — adapted to this crate's channel-based architecture.
pub async fn run(cfg: Config, listen_addr: String, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let http_client = Client::builder()
        .user_agent("probewatch/1.0")
        .build()?;

    let auth_cache = Arc::new(AuthTokenCache::new(
        http_client.clone(),
        cfg.authentication_clients.clone(),
    ));

    let orchestrator: Arc<dyn orchestrator::Orchestrator> = if cfg.watchdog.is_disabled()
        && !cfg.jobs.iter().any(|p| p.kind == model::ProbeKind::Memory)
    {
        Arc::new(NullOrchestrator)
    } else {
        Arc::new(KubeOrchestrator::connect().await?)
    };
    let cache_client: Arc<dyn cache::CacheClient> = Arc::new(RedisCacheClient::new());

    let task_state = Arc::new(TaskStateTable::new());
    let http_executor = Arc::new(HttpExecutor::new(http_client.clone(), auth_cache.clone()));
    let websocket_executor = Arc::new(WebSocketExecutor::new(auth_cache.clone()));
    let memory_executor = Arc::new(MemoryExecutor::new(orchestrator.clone()));

    let watchdog = Arc::new(Watchdog::new(cfg.watchdog.clone(), orchestrator, cache_client));
    let prometheus_handle = metrics::install_default_exporter();
    let metrics_sink = Arc::new(metrics::MetricsSink);

    let (result_tx, result_rx) = tokio::sync::mpsc::channel(cfg.jobs.len().max(16));
    let (metrics_tx, mut metrics_rx) = tokio::sync::mpsc::channel(cfg.jobs.len().max(16));
    let (audit_tx, mut audit_rx) = tokio::sync::mpsc::channel(cfg.jobs.len().max(16));

    let probes_by_id = index_probes(&cfg.jobs);
    let scheduler = Scheduler::new(
        cfg.jobs.clone(),
        task_state.clone(),
        http_executor,
        websocket_executor,
        memory_executor,
        result_tx,
    );
    let router = ResultRouter::new(
        probes_by_id,
        task_state.clone(),
        watchdog,
        metrics_tx,
        audit_tx,
    );

    let ready = Arc::new(AtomicBool::new(true));
    let api_state = api::ApiState {
        ready: ready.clone(),
        task_state: task_state.clone(),
        prometheus: prometheus_handle,
    };
    let app = api::router(api_state);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(%listen_addr, "http api listening");

    let mut api_shutdown = shutdown.clone();
    let serve_task = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.changed().await;
            })
            .await;
    });

    let metrics_consumer = tokio::spawn(async move {
        while let Some(event) = metrics_rx.recv().await {
            metrics_sink.observe(
                &event.metric_name,
                &event.metric_labels,
                event.timeout_secs,
                &event.snapshot,
            );
        }
    });

    let audit_consumer = tokio::spawn(async move {
        while let Some(snapshot) = audit_rx.recv().await {
            if snapshot.watchdog_fired {
                info!(probe_id = %snapshot.id, "watchdog action sequence fired");
            }
        }
    });

    let mut router_shutdown = shutdown.clone();
    let router_task = tokio::spawn(async move {
        tokio::select! {
            _ = router.run(result_rx) => {}
            _ = router_shutdown.changed() => {}
        }
    });

    let scheduler_shutdown = shutdown.clone();
    let scheduler_task = tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    shutdown.changed().await.ok();
    info!("shutdown signal received; draining in-flight work");
    tokio::time::timeout(Duration::from_secs(5), async {
        let _ = scheduler_task.await;
        let _ = serve_task.await;
    })
    .await
    .ok();
    router_task.abort();
    metrics_consumer.abort();
    audit_consumer.abort();

    Ok(())
}

/// Stand-in orchestrator used when no memory probes and no watchdog actions
/// are configured, so the process never attempts a cluster connection it
/// doesn't need (mirrors `cmd/cluster/cluster.go` returning `nil` when the
/// watchdog namespace and action list are both empty).
struct NullOrchestrator;

#[async_trait::async_trait]
impl orchestrator::Orchestrator for NullOrchestrator {
    async fn list_pod_memory_bytes(&self, _: &str, _: &str) -> Result<Vec<i64>> {
        Ok(vec![])
    }
    async fn get_replicas(&self, _: &str, _: &str) -> Result<i32> {
        Ok(0)
    }
    async fn set_replicas(&self, _: &str, _: &str, _: i32) -> Result<()> {
        Ok(())
    }
}
