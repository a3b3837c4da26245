//! Pod memory executor for `memory` probes.
//!
//! Grounded on `cmd/healthcheck/healthcheck.go`'s `checkMemory` and
//! `cmd/clients/kubernetes/operations.go`'s `GetPodMemory`: sum memory is
//! not taken, the probe fails if any single container exceeds the limit.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tracing::warn;

use crate::model::{Probe, TaskResult};
use crate::orchestrator::Orchestrator;

use super::Executor;

pub struct MemoryExecutor {
    orchestrator: Arc<dyn Orchestrator>,
}

impl MemoryExecutor {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        MemoryExecutor { orchestrator }
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn execute(&self, probe: &Probe, sender: Sender<TaskResult>) {
        let start = Instant::now();
        let label = probe.label.clone().unwrap_or_default();
        let namespace = probe.namespace.clone().unwrap_or_default();

        let readings = match self
            .orchestrator
            .list_pod_memory_bytes(&label, &namespace)
            .await
        {
            Ok(readings) => readings,
            Err(err) => {
                warn!(probe_id = %probe.id, error = %err, "failed to read pod memory metrics");
                let result = TaskResult {
                    id: probe.id.clone(),
                    result: false,
                    running: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                    url: None,
                    parameters: None,
                };
                let _ = sender.send(result).await;
                return;
            }
        };

        let over_limit = readings.iter().any(|&bytes| bytes > probe.limit_bytes);

        let result = TaskResult {
            id: probe.id.clone(),
            result: !over_limit,
            running: false,
            duration_ms: start.elapsed().as_millis() as u64,
            url: None,
            parameters: None,
        };
        let _ = sender.send(result).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::model::{AuthMode, ProbeKind};

    struct FakeOrchestrator {
        readings: Vec<i64>,
    }

    #[async_trait]
    impl Orchestrator for FakeOrchestrator {
        async fn list_pod_memory_bytes(&self, _: &str, _: &str) -> anyhow::Result<Vec<i64>> {
            Ok(self.readings.clone())
        }
        async fn get_replicas(&self, _: &str, _: &str) -> anyhow::Result<i32> {
            Ok(0)
        }
        async fn set_replicas(&self, _: &str, _: &str, _: i32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn make_probe(limit_bytes: i64) -> Probe {
        Probe {
            id: "p5".into(),
            description: String::new(),
            kind: ProbeKind::Memory,
            urls: vec![],
            body: None,
            auth: AuthMode::Anonymous,
            timeout_secs: 5,
            response_timeout_secs: 0,
            dependent_job: None,
            label: Some("myapp".into()),
            namespace: Some("default".into()),
            limit_bytes,
            watchdog_action: Default::default(),
            metric_name: "p5".into(),
            metric_labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn fails_when_any_container_exceeds_limit() {
        let orch = Arc::new(FakeOrchestrator {
            readings: vec![50, 200],
        });
        let executor = MemoryExecutor::new(orch);
        let probe = make_probe(100);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        executor.execute(&probe, tx).await;
        let result = rx.recv().await.unwrap();
        assert!(!result.result);
    }

    #[tokio::test]
    async fn succeeds_when_all_containers_under_limit() {
        let orch = Arc::new(FakeOrchestrator {
            readings: vec![10, 20],
        });
        let executor = MemoryExecutor::new(orch);
        let probe = make_probe(100);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        executor.execute(&probe, tx).await;
        let result = rx.recv().await.unwrap();
        assert!(result.result);
    }
}
