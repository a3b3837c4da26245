//! Orchestrator client: a narrow trait over the subset of the Kubernetes API
//! the watchdog and memory executor need, so tests can substitute a
//! recording fake instead of standing up a real cluster.
//!
//! Grounded on `cmd/clients/kubernetes/{kubernetes,operations}.go`: the
//! in-cluster-vs-kubeconfig detection, and the scale/memory-list operations.
//! `ScaleUp`'s lack of pre-scaledown-count memory is intentionally preserved
//! per the Design Notes open question — this client forces 1, not the prior
//! count. `DeletePod`/`GetPodIp` from the original client are not ported:
//! they are never reached by the original's own action dispatch switch
//! (`redis` / `deployment_scale_down` / `deployment_scale_up` only), so
//! there is no remediation path that would call them here either.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{ListParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client};
use serde_json::json;
use tracing::warn;

const IN_CLUSTER_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn list_pod_memory_bytes(&self, label: &str, namespace: &str) -> Result<Vec<i64>>;
    async fn get_replicas(&self, name: &str, namespace: &str) -> Result<i32>;
    async fn set_replicas(&self, name: &str, namespace: &str, replicas: i32) -> Result<()>;
}

/// Parses a Kubernetes resource quantity string (e.g. `"128974848"`,
/// `"512Ki"`, `"256Mi"`) into a byte count, matching what
/// `resource.Quantity.AsInt64()` does for the suffixes memory usage
/// actually reports in (binary and decimal SI, no milli-scale).
fn parse_quantity_bytes(raw: &str) -> Option<i64> {
    const BINARY: &[(&str, f64)] = &[
        ("Ei", (1u64 << 60) as f64),
        ("Pi", (1u64 << 50) as f64),
        ("Ti", (1u64 << 40) as f64),
        ("Gi", (1u64 << 30) as f64),
        ("Mi", (1u64 << 20) as f64),
        ("Ki", (1u64 << 10) as f64),
    ];
    const DECIMAL: &[(&str, f64)] = &[
        ("E", 1e18),
        ("P", 1e15),
        ("T", 1e12),
        ("G", 1e9),
        ("M", 1e6),
        ("k", 1e3),
    ];
    for (suffix, multiplier) in BINARY.iter().chain(DECIMAL) {
        if let Some(digits) = raw.strip_suffix(suffix) {
            return digits.parse::<f64>().ok().map(|n| (n * multiplier) as i64);
        }
    }
    raw.parse::<i64>().ok()
}

pub struct KubeOrchestrator {
    client: Client,
}

impl KubeOrchestrator {
    pub async fn connect() -> Result<Self> {
        let client = if Path::new(IN_CLUSTER_TOKEN_PATH).exists() {
            Client::try_default()
                .await
                .context("failed to build in-cluster kube client")?
        } else {
            Client::try_default()
                .await
                .context("failed to build kube client from local kubeconfig")?
        };
        Ok(KubeOrchestrator { client })
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn list_pod_memory_bytes(&self, label: &str, namespace: &str) -> Result<Vec<i64>> {
        // metrics.k8s.io is an aggregated API k8s-openapi does not model as a
        // typed resource, so PodMetrics is queried through kube's dynamic
        // API, matching how the original queries PodMetricses by label
        // selector and reads each container's memory usage without summing.
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        let ar = ApiResource::from_gvk(&gvk);
        let pod_metrics: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let lp = ListParams::default().labels(&format!("app={label}"));
        let list = pod_metrics
            .list(&lp)
            .await
            .with_context(|| format!("failed to list pod metrics for label app={label}"))?;

        let mut readings = Vec::new();
        for pod_metric in &list.items {
            let Some(containers) = pod_metric.data.get("containers").and_then(|v| v.as_array())
            else {
                continue;
            };
            for container in containers {
                let usage = container
                    .get("usage")
                    .and_then(|u| u.get("memory"))
                    .and_then(|m| m.as_str());
                match usage.and_then(parse_quantity_bytes) {
                    Some(bytes) => readings.push(bytes),
                    None => warn!(label, namespace, "could not parse container memory usage quantity"),
                }
            }
        }
        Ok(readings)
    }

    async fn get_replicas(&self, name: &str, namespace: &str) -> Result<i32> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let scale = deployments
            .get_scale(name)
            .await
            .with_context(|| format!("failed to get scale for deployment {name}"))?;
        Ok(scale
            .spec
            .and_then(|s| s.replicas)
            .or_else(|| scale.status.map(|s| s.replicas))
            .unwrap_or(0))
    }

    async fn set_replicas(&self, name: &str, namespace: &str, replicas: i32) -> Result<()> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = Patch::Merge(json!({ "spec": { "replicas": replicas } }));
        deployments
            .patch_scale(name, &PatchParams::default(), &patch)
            .await
            .with_context(|| format!("failed to set scale for deployment {name}"))?;
        Ok(())
    }
}
