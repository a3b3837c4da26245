//! WebSocket executor for `websocket` probes.
//!
//! Grounded on `cmd/clients/websocket/websocket.go`: a session table keyed
//! by (probe id, url) prevents redialing a live connection; the reader is a
//! dedicated task per session; read errors and idle-deadline expiry close
//! the session, remove its table entry, and emit the terminal
//! `{result=false, running=false}` event that re-arms the scheduler.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc::Sender, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::auth::AuthTokenCache;
use crate::model::{AuthMode, Probe, TaskResult};

use super::Executor;

#[derive(Hash, Eq, PartialEq, Clone)]
struct SessionKey {
    probe_id: String,
    url: String,
}

pub struct WebSocketExecutor {
    auth_cache: Arc<AuthTokenCache>,
    sessions: Arc<Mutex<HashSet<SessionKey>>>,
}

impl WebSocketExecutor {
    pub fn new(auth_cache: Arc<AuthTokenCache>) -> Self {
        WebSocketExecutor {
            auth_cache,
            sessions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    async fn spawn_session(&self, probe: Probe, url: String, sender: Sender<TaskResult>) {
        let auth_cache = self.auth_cache.clone();
        let sessions = self.sessions.clone();
        let key = SessionKey {
            probe_id: probe.id.clone(),
            url: url.clone(),
        };

        tokio::spawn(async move {
            let start = Instant::now();

            let mut ws = match tokio_tungstenite::connect_async(&url).await {
                Ok((stream, _response)) => stream,
                Err(err) => {
                    warn!(probe_id = %probe.id, url, error = %err, "websocket dial failed");
                    sessions.lock().await.remove(&key);
                    let _ = sender
                        .send(TaskResult {
                            id: probe.id.clone(),
                            result: false,
                            running: false,
                            duration_ms: start.elapsed().as_millis() as u64,
                            url: Some(url.clone()),
                            parameters: None,
                        })
                        .await;
                    return;
                }
            };

            if let AuthMode::Named(client_id) = &probe.auth {
                match auth_cache.get_token(client_id).await {
                    Ok(token) => {
                        let frame = serde_json::json!({ "accessToken": token }).to_string();
                        if let Err(err) = ws.send(Message::Text(frame.into())).await {
                            warn!(probe_id = %probe.id, url, error = %err, "failed to send auth frame");
                        }
                    }
                    Err(err) => {
                        warn!(probe_id = %probe.id, url, error = %err, "failed to fetch auth token for websocket session");
                    }
                }
            }

            let idle_deadline = Duration::from_secs(probe.response_timeout_secs.max(1));
            let mut last_message = Instant::now();

            loop {
                match tokio::time::timeout(idle_deadline, ws.next()).await {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let duration_ms = last_message.elapsed().as_millis() as u64;
                        last_message = Instant::now();

                        let parameters = serde_json::from_str::<Vec<serde_json::Map<String, Value>>>(&text)
                            .ok()
                            .and_then(|mut rows| rows.drain(..).next())
                            .map(|row| row.into_iter().collect());
                        if parameters.is_none() {
                            debug!(probe_id = %probe.id, url, "websocket payload was not a non-empty JSON array; ignoring parameters");
                        }

                        let result = TaskResult {
                            id: probe.id.clone(),
                            result: true,
                            running: true,
                            duration_ms,
                            url: Some(url.clone()),
                            parameters,
                        };
                        if sender.send(result).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(_other_frame))) => continue,
                    Ok(Some(Err(err))) => {
                        debug!(probe_id = %probe.id, url, error = %err, "websocket read error");
                        break;
                    }
                    Ok(None) => {
                        debug!(probe_id = %probe.id, url, "websocket stream closed by remote");
                        break;
                    }
                    Err(_elapsed) => {
                        debug!(probe_id = %probe.id, url, "websocket idle deadline expired");
                        break;
                    }
                }
            }

            sessions.lock().await.remove(&key);
            let duration_ms = start.elapsed().as_millis() as u64;
            let _ = sender
                .send(TaskResult {
                    id: probe.id.clone(),
                    result: false,
                    running: false,
                    duration_ms,
                    url: Some(url),
                    parameters: None,
                })
                .await;
        });
    }
}

#[async_trait]
impl Executor for WebSocketExecutor {
    async fn execute(&self, probe: &Probe, sender: Sender<TaskResult>) {
        for url in &probe.urls {
            let key = SessionKey {
                probe_id: probe.id.clone(),
                url: url.clone(),
            };
            {
                let mut sessions = self.sessions.lock().await;
                if sessions.contains(&key) {
                    continue;
                }
                sessions.insert(key);
            }
            self.spawn_session(probe.clone(), url.clone(), sender.clone())
                .await;
        }
    }
}
