//! Watchdog: per-probe failure accounting and remediation action sequencing.
//!
//! Grounded on `cmd/watchdog/watchdog.go`'s action dispatch switch and
//! `healthcheck.go`'s failure-threshold/cooldown bookkeeping. Collapsed into
//! one component whose `observe` method the Result Router calls
//! synchronously (see `router.rs`) so `watchdog_fired` lands on the exact
//! snapshot forwarded to the metrics sink in the same tick.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::cache::CacheClient;
use crate::config::WatchdogConfig;
use crate::model::{now_secs, ActionDef, ActionKind, FailRecord, WatchdogAction};
use crate::orchestrator::Orchestrator;

pub struct Watchdog {
    config: WatchdogConfig,
    records: Mutex<HashMap<String, FailRecord>>,
    orchestrator: std::sync::Arc<dyn Orchestrator>,
    cache: std::sync::Arc<dyn CacheClient>,
}

impl Watchdog {
    pub fn new(
        config: WatchdogConfig,
        orchestrator: std::sync::Arc<dyn Orchestrator>,
        cache: std::sync::Arc<dyn CacheClient>,
    ) -> Self {
        Watchdog {
            config,
            records: Mutex::new(HashMap::new()),
            orchestrator,
            cache,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.config.is_disabled()
    }

    fn action_def(&self, id: &str) -> Option<ActionDef> {
        self.config.actions.iter().find(|a| a.id == id).cloned()
    }

    /// Updates failure accounting for `probe_id` and decides whether the
    /// configured action sequence should fire this tick. Returns true if it
    /// fired (action execution itself is dispatched by the caller onto a
    /// background task; this call only updates bookkeeping and decides).
    pub fn observe(&self, probe_id: &str, action: &WatchdogAction, success: bool) -> bool {
        if self.is_disabled() || !action.enabled {
            return false;
        }

        let mut records = self.records.lock().expect("watchdog lock poisoned");
        let record = records.entry(probe_id.to_string()).or_default();

        if success {
            record.failure_checks = 0;
            return false;
        }

        record.failure_checks += 1;
        let now = now_secs();
        let cooldown_elapsed = now.saturating_sub(record.restart_time) > action.await_after_restart_secs;

        if record.failure_checks >= action.failure_threshold && cooldown_elapsed {
            record.restart_time = now;
            true
        } else {
            false
        }
    }

    /// Executes the configured action sequence for a probe. Best-effort: a
    /// failing action is logged and the sequence continues.
    pub async fn run_actions(&self, probe_id: &str, action: &WatchdogAction) {
        for action_id in &action.actions {
            let Some(def) = self.action_def(action_id) else {
                warn!(probe_id, action_id, "watchdog action id not found in action table");
                continue;
            };
            if let Err(err) = self.run_one_action(&def).await {
                error!(probe_id, action_id, error = %err, "watchdog action failed");
            } else {
                info!(probe_id, action_id, kind = ?def.kind, "watchdog action executed");
            }
        }
    }

    async fn run_one_action(&self, def: &ActionDef) -> anyhow::Result<()> {
        match def.kind {
            ActionKind::Redis => self.cache.execute(&def.connection_string, &def.cmd).await,
            ActionKind::DeploymentScaleDown => {
                for name in &def.items {
                    self.orchestrator
                        .set_replicas(name, &self.config.namespace, 0)
                        .await?;
                }
                Ok(())
            }
            ActionKind::DeploymentScaleUp => {
                for name in &def.items {
                    let current = self
                        .orchestrator
                        .get_replicas(name, &self.config.namespace)
                        .await?;
                    if current == 0 {
                        self.orchestrator
                            .set_replicas(name, &self.config.namespace, 1)
                            .await?;
                    }
                }
                Ok(())
            }
        }
    }
}
