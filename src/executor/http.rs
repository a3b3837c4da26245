//! HTTP executor for `http_get` and `http_post` probes.
//!
//! Grounded on `cmd/clients/http/http.go`'s `Execute`/`request`/`performRequest`:
//! one request per configured URL, `accept: */*` + JSON content-type headers,
//! a per-request deadline when `response_timeout` is set, success iff status
//! is exactly 200.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};

use crate::auth::AuthTokenCache;
use crate::model::{AuthMode, Probe, ProbeKind, TaskResult};

use super::Executor;

pub struct HttpExecutor {
    client: Client,
    auth_cache: Arc<AuthTokenCache>,
}

impl HttpExecutor {
    pub fn new(client: Client, auth_cache: Arc<AuthTokenCache>) -> Self {
        HttpExecutor { client, auth_cache }
    }

    async fn request_one(&self, probe: &Probe, url: &str) -> TaskResult {
        let start = Instant::now();

        let mut builder = match probe.kind {
            ProbeKind::HttpPost => self.client.post(url),
            _ => self.client.get(url),
        };
        builder = builder
            .header("accept", "*/*")
            .header("content-type", "application/json");

        if let Some(body) = &probe.body {
            builder = builder.body(body.clone());
        }

        if probe.response_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(probe.response_timeout_secs));
        }

        if let AuthMode::Named(client_id) = &probe.auth {
            match self.auth_cache.get_token(client_id).await {
                Ok(token) => {
                    builder = builder.bearer_auth(token);
                }
                Err(err) => {
                    warn!(probe_id = %probe.id, error = %err, "failed to obtain auth token");
                    return TaskResult {
                        id: probe.id.clone(),
                        result: false,
                        running: false,
                        duration_ms: start.elapsed().as_millis() as u64,
                        url: Some(url.to_string()),
                        parameters: None,
                    };
                }
            }
        }

        let outcome = builder.send().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(resp) if resp.status().as_u16() == 200 => {
                let _ = resp.bytes().await;
                true
            }
            Ok(resp) => {
                debug!(probe_id = %probe.id, url, status = %resp.status(), "probe returned non-200");
                false
            }
            Err(err) => {
                debug!(probe_id = %probe.id, url, error = %err, "probe request failed");
                false
            }
        };

        TaskResult {
            id: probe.id.clone(),
            result,
            running: false,
            duration_ms,
            url: Some(url.to_string()),
            parameters: None,
        }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, probe: &Probe, sender: Sender<TaskResult>) {
        for url in &probe.urls {
            let result = self.request_one(probe, url).await;
            if sender.send(result).await.is_err() {
                warn!(probe_id = %probe.id, "result channel closed; dropping remaining results");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use std::collections::HashMap;

    fn make_probe(urls: Vec<String>) -> Probe {
        Probe {
            id: "p1".into(),
            description: String::new(),
            kind: ProbeKind::HttpGet,
            urls,
            body: None,
            auth: AuthMode::Anonymous,
            timeout_secs: 5,
            response_timeout_secs: 1,
            dependent_job: None,
            label: None,
            namespace: None,
            limit_bytes: 0,
            watchdog_action: Default::default(),
            metric_name: "p1".into(),
            metric_labels: HashMap::new(),
        }
    }

    fn make_executor() -> HttpExecutor {
        let auth_cache = Arc::new(AuthTokenCache::new(Client::new(), HashMap::new()));
        HttpExecutor::new(Client::new(), auth_cache)
    }

    #[tokio::test]
    async fn success_on_200() {
        let server = MockServer::start_async().await;
        let m1 = server
            .mock_async(|when, then| {
                when.method(GET).path("/ok");
                then.status(200).body("ok");
            })
            .await;

        let probe = make_probe(vec![format!("{}/ok", server.base_url())]);
        let executor = make_executor();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        executor.execute(&probe, tx).await;
        let result = rx.recv().await.unwrap();
        m1.assert();
        assert!(result.result);
    }

    #[tokio::test]
    async fn failure_on_500() {
        let server = MockServer::start_async().await;
        let m1 = server
            .mock_async(|when, then| {
                when.method(GET).path("/err");
                then.status(500);
            })
            .await;

        let probe = make_probe(vec![format!("{}/err", server.base_url())]);
        let executor = make_executor();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        executor.execute(&probe, tx).await;
        let result = rx.recv().await.unwrap();
        m1.assert();
        assert!(!result.result);
    }

    #[tokio::test]
    async fn one_result_per_configured_url() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/a");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/b");
                then.status(200);
            })
            .await;

        let probe = make_probe(vec![
            format!("{}/a", server.base_url()),
            format!("{}/b", server.base_url()),
        ]);
        let executor = make_executor();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        executor.execute(&probe, tx).await;
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
