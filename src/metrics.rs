//! Metrics Sink: translates routed `TaskStatus` snapshots into per-probe
//! Prometheus gauges.
//!
//! Grounded on `cmd/exporter/exporter.go`'s `setCounters`, rebuilt on the
//! `metrics` facade the teacher crate already depends on for its latency
//! histogram, with the recorder-install pattern taken from
//! `jwks-cache`'s `src/metrics.rs` (`OnceLock<PrometheusHandle>`, idempotent
//! install, dynamically built `Label` slices per call rather than
//! pre-registered label sets).

use std::sync::OnceLock;

use metrics::{Label, SharedString};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::model::TaskStatus;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder exactly once. Safe to call
/// multiple times (e.g. once per test) — later calls are no-ops.
pub fn install_default_exporter() -> PrometheusHandle {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return handle.clone();
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");
    let _ = PROMETHEUS_HANDLE.set(handle.clone());
    handle
}

pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn dynamic_labels(constant: &std::collections::HashMap<String, String>) -> Vec<Label> {
    constant
        .iter()
        .map(|(k, v)| Label::new(k.clone(), v.clone()))
        .collect()
}

/// Records one routed `TaskStatus` against the six gauge families named
/// `<metric_name>_status`, `_downtime`, `_response_time`,
/// `_failed_attempts_count`, `_watchdog_action_count`, `_messages_count`.
pub struct MetricsSink;

impl MetricsSink {
    pub fn observe(
        &self,
        metric_name: &str,
        metric_labels: &std::collections::HashMap<String, String>,
        timeout_secs: u64,
        snapshot: &TaskStatus,
    ) {
        let labels = dynamic_labels(metric_labels);

        let status_name: SharedString = format!("{metric_name}_status").into();
        metrics::gauge!(status_name, labels.iter()).set(if snapshot.status { 1.0 } else { 0.0 });

        let downtime_name: SharedString = format!("{metric_name}_downtime").into();
        let downtime_gauge = metrics::gauge!(downtime_name, labels.iter());
        if snapshot.status {
            downtime_gauge.set(0.0);
        } else {
            downtime_gauge.increment(timeout_secs as f64);
        }

        if !snapshot.status {
            let failed_name: SharedString = format!("{metric_name}_failed_attempts_count").into();
            metrics::counter!(failed_name, labels.iter()).increment(1);
        }

        if let Some(result) = &snapshot.last_result {
            let response_time_name: SharedString = format!("{metric_name}_response_time").into();
            metrics::gauge!(response_time_name, labels.iter()).set(result.duration_ms as f64);

            if snapshot.status {
                if let Some(params) = &result.parameters {
                    if let Some(uid) = params.get("uid").and_then(|v| v.as_str()) {
                        let messages_name: SharedString =
                            format!("{metric_name}_messages_count").into();
                        let mut msg_labels = labels.clone();
                        msg_labels.push(Label::new("uid", uid.to_string()));
                        metrics::counter!(messages_name, msg_labels.iter()).increment(1);
                    }
                }
            }
        }

        if snapshot.watchdog_fired {
            let action_name: SharedString = format!("{metric_name}_watchdog_action_count").into();
            metrics::counter!(action_name, labels.iter()).increment(1);
        }
    }
}
