//! Executors perform one probe attempt (or, for WebSocket, own a long-lived
//! session) and emit `TaskResult` events onto the shared result channel.
//!
//! Grounded on `cmd/clients/client.go`'s `Executor` interface
//! (`Execute(job, channel)`), generalized so the scheduler can dispatch
//! uniformly regardless of probe type.

pub mod http;
pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use crate::model::{Probe, TaskResult};

#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs one attempt (HTTP, memory) or ensures a session is live
    /// (WebSocket), pushing every resulting `TaskResult` onto `sender`.
    /// Never awaits a reply; the Result Router consumes `sender`'s receiver
    /// end independently.
    async fn execute(&self, probe: &Probe, sender: Sender<TaskResult>);
}
