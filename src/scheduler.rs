//! Scheduler: a single 1-second ticker that decides when each configured
//! probe should run and dispatches it to the executor for its type.
//!
//! Grounded on `cmd/manager/manager.go`'s `run`/`isTaskShoudRun`/
//! `processTask` loop, minus the Go original's cyclic `Manager` struct — the
//! scheduler here only touches the Task State Table and the executors, never
//! the metrics sink or watchdog directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc::Sender, watch};
use tracing::{debug, warn};

use crate::executor::http::HttpExecutor;
use crate::executor::memory::MemoryExecutor;
use crate::executor::websocket::WebSocketExecutor;
use crate::executor::Executor;
use crate::model::{now_secs, Probe, ProbeKind, TaskResult};
use crate::state::TaskStateTable;

pub struct Scheduler {
    probes: Vec<Probe>,
    state: Arc<TaskStateTable>,
    http: Arc<HttpExecutor>,
    websocket: Arc<WebSocketExecutor>,
    memory: Arc<MemoryExecutor>,
    result_tx: Sender<TaskResult>,
}

impl Scheduler {
    pub fn new(
        probes: Vec<Probe>,
        state: Arc<TaskStateTable>,
        http: Arc<HttpExecutor>,
        websocket: Arc<WebSocketExecutor>,
        memory: Arc<MemoryExecutor>,
        result_tx: Sender<TaskResult>,
    ) -> Self {
        Scheduler {
            probes,
            state,
            http,
            websocket,
            memory,
            result_tx,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("scheduler stopping after shutdown signal");
                        break;
                    }
                }
            }
        }
    }

    fn tick(&self) {
        for probe in &self.probes {
            if !self.should_run(probe) {
                continue;
            }
            self.state.mark_running(&probe.id);
            self.dispatch(probe.clone());
        }
    }

    /// The should-run predicate from the component design: running check,
    /// dependent-job check, then timeout-elapsed check.
    fn should_run(&self, probe: &Probe) -> bool {
        if self.state.is_running(&probe.id) {
            return false;
        }

        if let Some(dep) = &probe.dependent_job {
            if !dep.is_empty() {
                match self.state.status_of(dep) {
                    Some(true) => {}
                    _ => return false,
                }
            }
        }

        match self.state.snapshot(&probe.id) {
            None => true,
            Some(snapshot) => now_secs().saturating_sub(snapshot.last_call) >= probe.timeout_secs,
        }
    }

    fn dispatch(&self, probe: Probe) {
        let result_tx = self.result_tx.clone();
        match probe.kind {
            ProbeKind::HttpGet | ProbeKind::HttpPost => {
                let executor = self.http.clone();
                tokio::spawn(async move {
                    executor.execute(&probe, result_tx).await;
                });
            }
            ProbeKind::Websocket => {
                let executor = self.websocket.clone();
                tokio::spawn(async move {
                    executor.execute(&probe, result_tx).await;
                });
            }
            ProbeKind::Memory => {
                let executor = self.memory.clone();
                tokio::spawn(async move {
                    executor.execute(&probe, result_tx).await;
                });
            }
        }
    }
}

/// Builds a lookup table from probe id to probe, used by the Result Router
/// to recover static configuration (metric name, watchdog action, timeout)
/// for a routed event.
pub fn index_probes(probes: &[Probe]) -> HashMap<String, Probe> {
    probes.iter().map(|p| (p.id.clone(), p.clone())).collect()
}
