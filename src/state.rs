//! Task State Table: the single shared mutable structure in the system.
//!
//! All access is serialized by one `std::sync::Mutex`, held only across map
//! reads/writes and never across an `.await` — the same discipline the
//! original source used its per-field locked getters/setters for (see
//! `healthcheck.go`'s `getTaskOnline`/`setTaskOnline` pattern), collapsed
//! here into a single table lock since every field of a `TaskStatus` changes
//! together on each routed result.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{now_secs, TaskResult, TaskStatus};

#[derive(Default)]
pub struct TaskStateTable {
    inner: Mutex<HashMap<String, TaskStatus>>,
}

impl TaskStateTable {
    pub fn new() -> Self {
        TaskStateTable {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Invariant 5: the scheduler must never dispatch a probe while it is
    /// already running.
    pub fn is_running(&self, id: &str) -> bool {
        self.inner
            .lock()
            .expect("task state lock poisoned")
            .get(id)
            .map(|t| t.running)
            .unwrap_or(false)
    }

    pub fn status_of(&self, id: &str) -> Option<bool> {
        self.inner
            .lock()
            .expect("task state lock poisoned")
            .get(id)
            .map(|t| t.status)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.inner
            .lock()
            .expect("task state lock poisoned")
            .contains_key(id)
    }

    /// Called by the Scheduler right before dispatch.
    pub fn mark_running(&self, id: &str) {
        let mut guard = self.inner.lock().expect("task state lock poisoned");
        guard
            .entry(id.to_string())
            .or_insert_with(|| TaskStatus::new(id.to_string()))
            .running = true;
    }

    /// Called by the Result Router. Returns a snapshot of the updated
    /// status for forwarding to the metrics sink and watchdog.
    pub fn route_result(&self, result: TaskResult) -> TaskStatus {
        let mut guard = self.inner.lock().expect("task state lock poisoned");
        let entry = guard
            .entry(result.id.clone())
            .or_insert_with(|| TaskStatus::new(result.id.clone()));
        entry.running = result.running;
        entry.last_call = now_secs();
        entry.status = result.result;
        entry.last_result = Some(result);
        entry.watchdog_fired = false;
        entry.clone()
    }

    /// Sets `watchdog_fired` on the most recently routed snapshot for a
    /// probe; called synchronously by the Result Router after consulting
    /// the Watchdog, before the snapshot is forwarded to the metrics sink.
    pub fn mark_watchdog_fired(&self, id: &str) -> Option<TaskStatus> {
        let mut guard = self.inner.lock().expect("task state lock poisoned");
        if let Some(t) = guard.get_mut(id) {
            t.watchdog_fired = true;
            Some(t.clone())
        } else {
            None
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<TaskStatus> {
        self.inner
            .lock()
            .expect("task state lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn any_completed_cycle(&self) -> bool {
        self.inner
            .lock()
            .expect("task state lock poisoned")
            .values()
            .any(|t| t.last_call > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_probe_is_not_running() {
        let table = TaskStateTable::new();
        assert!(!table.is_running("p1"));
    }

    #[test]
    fn mark_running_then_route_clears_running() {
        let table = TaskStateTable::new();
        table.mark_running("p1");
        assert!(table.is_running("p1"));

        let result = TaskResult {
            id: "p1".into(),
            result: true,
            running: false,
            duration_ms: 12,
            url: None,
            parameters: None,
        };
        let snap = table.route_result(result);
        assert!(!snap.running);
        assert!(snap.status);
        assert!(!table.is_running("p1"));
    }

    #[test]
    fn watchdog_fired_is_reset_on_next_route() {
        let table = TaskStateTable::new();
        let result = TaskResult {
            id: "p1".into(),
            result: false,
            running: false,
            duration_ms: 5,
            url: None,
            parameters: None,
        };
        table.route_result(result.clone());
        let snap = table.mark_watchdog_fired("p1").unwrap();
        assert!(snap.watchdog_fired);

        let snap2 = table.route_result(result);
        assert!(!snap2.watchdog_fired);
    }
}
