//! Result Router: the single consumer of the shared result channel.
//!
//! Grounded on `cmd/manager/manager.go`'s `resultProcessor`, with the
//! Go original's two unbuffered fan-out channels (`exporter.Channel`,
//! `watchdog.Channel`) upgraded to bounded, non-blocking sends — a full
//! buffer drops the event for that consumer and logs, so a slow sink can
//! never stall probing. The watchdog's failure-accounting decision is
//! still made synchronously here (see `watchdog.rs` and the Design Notes)
//! so `watchdog_fired` is correct on the exact snapshot handed to the
//! metrics channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{Receiver, Sender};
use tracing::warn;

use crate::model::{Probe, TaskResult, TaskStatus};
use crate::state::TaskStateTable;
use crate::watchdog::Watchdog;

/// Everything the metrics sink needs to record one routed event, bundled so
/// the sink consumer doesn't need access to the static probe table.
#[derive(Debug, Clone)]
pub struct MetricsEvent {
    pub metric_name: String,
    pub metric_labels: HashMap<String, String>,
    pub timeout_secs: u64,
    pub snapshot: TaskStatus,
}

pub struct ResultRouter {
    probes: HashMap<String, Probe>,
    state: Arc<TaskStateTable>,
    watchdog: Arc<Watchdog>,
    metrics_tx: Sender<MetricsEvent>,
    audit_tx: Sender<TaskStatus>,
}

impl ResultRouter {
    pub fn new(
        probes: HashMap<String, Probe>,
        state: Arc<TaskStateTable>,
        watchdog: Arc<Watchdog>,
        metrics_tx: Sender<MetricsEvent>,
        audit_tx: Sender<TaskStatus>,
    ) -> Self {
        ResultRouter {
            probes,
            state,
            watchdog,
            metrics_tx,
            audit_tx,
        }
    }

    pub async fn run(&self, mut result_rx: Receiver<TaskResult>) {
        while let Some(result) = result_rx.recv().await {
            self.route_one(result).await;
        }
    }

    async fn route_one(&self, result: TaskResult) {
        let Some(probe) = self.probes.get(&result.id) else {
            warn!(probe_id = %result.id, "routed result for unknown probe id; dropping");
            return;
        };

        let mut snapshot = self.state.route_result(result);

        let fired = self
            .watchdog
            .observe(&probe.id, &probe.watchdog_action, snapshot.status);

        if fired {
            if let Some(updated) = self.state.mark_watchdog_fired(&probe.id) {
                snapshot = updated;
            }
            let watchdog = self.watchdog.clone();
            let probe_id = probe.id.clone();
            let action = probe.watchdog_action.clone();
            tokio::spawn(async move {
                watchdog.run_actions(&probe_id, &action).await;
            });
        }

        let event = MetricsEvent {
            metric_name: probe.metric_name.clone(),
            metric_labels: probe.metric_labels.clone(),
            timeout_secs: probe.timeout_secs,
            snapshot: snapshot.clone(),
        };
        if self.metrics_tx.try_send(event).is_err() {
            warn!(probe_id = %probe.id, "metrics channel full; dropping event");
        }
        if self.audit_tx.try_send(snapshot).is_err() {
            warn!(probe_id = %probe.id, "watchdog audit channel full; dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheClient;
    use crate::config::WatchdogConfig;
    use crate::model::{now_secs, AuthMode, ProbeKind};
    use crate::orchestrator::Orchestrator;
    use async_trait::async_trait;

    struct NoopOrchestrator;
    #[async_trait]
    impl Orchestrator for NoopOrchestrator {
        async fn list_pod_memory_bytes(&self, _: &str, _: &str) -> anyhow::Result<Vec<i64>> {
            Ok(vec![])
        }
        async fn get_replicas(&self, _: &str, _: &str) -> anyhow::Result<i32> {
            Ok(0)
        }
        async fn set_replicas(&self, _: &str, _: &str, _: i32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NoopCache;
    #[async_trait]
    impl CacheClient for NoopCache {
        async fn execute(&self, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn make_probe() -> Probe {
        Probe {
            id: "p1".into(),
            description: String::new(),
            kind: ProbeKind::HttpGet,
            urls: vec![],
            body: None,
            auth: AuthMode::Anonymous,
            timeout_secs: 1,
            response_timeout_secs: 1,
            dependent_job: None,
            label: None,
            namespace: None,
            limit_bytes: 0,
            watchdog_action: crate::model::WatchdogAction {
                enabled: true,
                actions: vec![],
                failure_threshold: 1,
                await_after_restart_secs: 0,
            },
            metric_name: "p1".into(),
            metric_labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn routes_result_and_forwards_to_metrics_and_audit() {
        let probe = make_probe();
        let mut probes = HashMap::new();
        probes.insert(probe.id.clone(), probe.clone());

        let state = Arc::new(TaskStateTable::new());
        let watchdog = Arc::new(Watchdog::new(
            WatchdogConfig {
                namespace: "ns".into(),
                actions: vec![],
            },
            Arc::new(NoopOrchestrator),
            Arc::new(NoopCache),
        ));

        let (metrics_tx, mut metrics_rx) = tokio::sync::mpsc::channel(4);
        let (audit_tx, mut audit_rx) = tokio::sync::mpsc::channel(4);
        let router = ResultRouter::new(probes, state.clone(), watchdog, metrics_tx, audit_tx);

        router
            .route_one(TaskResult {
                id: "p1".into(),
                result: false,
                running: false,
                duration_ms: 5,
                url: None,
                parameters: None,
            })
            .await;

        let metrics_event = metrics_rx.recv().await.unwrap();
        assert_eq!(metrics_event.metric_name, "p1");
        assert!(metrics_event.snapshot.watchdog_fired);

        let audit_event = audit_rx.recv().await.unwrap();
        assert!(audit_event.watchdog_fired);

        // Give the spawned action-execution task a chance to run; it has no
        // actions configured so it should complete almost immediately.
        tokio::task::yield_now().await;
        let _ = now_secs();
    }

    #[tokio::test]
    async fn unknown_probe_id_is_dropped_without_panicking() {
        let state = Arc::new(TaskStateTable::new());
        let watchdog = Arc::new(Watchdog::new(
            WatchdogConfig::default(),
            Arc::new(NoopOrchestrator),
            Arc::new(NoopCache),
        ));
        let (metrics_tx, mut metrics_rx) = tokio::sync::mpsc::channel(4);
        let (audit_tx, _audit_rx) = tokio::sync::mpsc::channel(4);
        let router = ResultRouter::new(HashMap::new(), state, watchdog, metrics_tx, audit_tx);

        router
            .route_one(TaskResult {
                id: "unknown".into(),
                result: true,
                running: false,
                duration_ms: 1,
                url: None,
                parameters: None,
            })
            .await;

        assert!(metrics_rx.try_recv().is_err());
    }
}
