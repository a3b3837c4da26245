//! Static configuration shapes and the dynamic records derived from them.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How a probe authenticates outbound requests.
///
/// Grounded on the original source's `Job.Auth` = `{enabled, client}` pair,
/// collapsed into one tagged value per the redesign notes so an unregistered
/// client id is caught at config-validation time instead of falling back to a
/// sentinel at request time. The wire shape stays `{"enabled":bool,"client":string}`
/// (see `AuthWire` below); only the in-memory representation is a tagged enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Anonymous,
    Named(String),
}

impl Default for AuthMode {
    fn default() -> Self {
        AuthMode::Anonymous
    }
}

/// Wire shape of a probe's `auth` field: `{"enabled": bool, "client": "<id>"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AuthWire {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    client: Option<String>,
}

fn deserialize_auth_mode<'de, D>(deserializer: D) -> Result<AuthMode, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = AuthWire::deserialize(deserializer)?;
    if !wire.enabled {
        return Ok(AuthMode::Anonymous);
    }
    match wire.client {
        Some(client) => Ok(AuthMode::Named(client)),
        None => Ok(AuthMode::Anonymous),
    }
}

fn serialize_auth_mode<S>(mode: &AuthMode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let wire = match mode {
        AuthMode::Anonymous => AuthWire {
            enabled: false,
            client: None,
        },
        AuthMode::Named(client) => AuthWire {
            enabled: true,
            client: Some(client.clone()),
        },
    };
    wire.serialize(serializer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    HttpGet,
    HttpPost,
    Websocket,
    Memory,
}

/// Remediation action sequence attached to a probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchdogAction {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default, rename = "failureThreshold")]
    pub failure_threshold: u32,
    #[serde(default, rename = "awaitAfterRestart")]
    pub await_after_restart_secs: u64,
}

/// One configured health check, immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    pub id: String,
    #[serde(default, rename = "desc")]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ProbeKind,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_auth_mode",
        serialize_with = "serialize_auth_mode"
    )]
    pub auth: AuthMode,
    #[serde(rename = "timeout")]
    pub timeout_secs: u64,
    #[serde(default, rename = "responseTimeout")]
    pub response_timeout_secs: u64,
    #[serde(default, rename = "dependentJob")]
    pub dependent_job: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, rename = "limit")]
    pub limit_bytes: i64,
    #[serde(default)]
    pub watchdog_action: WatchdogAction,
    #[serde(rename = "metricName")]
    pub metric_name: String,
    #[serde(default, rename = "metricLabels")]
    pub metric_labels: HashMap<String, String>,
}

/// A single action definition from the global `watchdog.actions` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, rename = "connectionstring")]
    pub connection_string: String,
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Redis,
    DeploymentScaleDown,
    DeploymentScaleUp,
}

/// One probe attempt's outcome, as produced by an executor.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub id: String,
    pub result: bool,
    pub running: bool,
    pub duration_ms: u64,
    pub url: Option<String>,
    pub parameters: Option<HashMap<String, serde_json::Value>>,
}

/// Per-probe dynamic record, shared by the scheduler, router, watchdog and
/// metrics sink.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub id: String,
    pub running: bool,
    pub last_call: u64,
    pub status: bool,
    pub last_result: Option<TaskResult>,
    pub watchdog_fired: bool,
}

impl TaskStatus {
    pub fn new(id: String) -> Self {
        TaskStatus {
            id,
            running: false,
            last_call: 0,
            status: false,
            last_result: None,
            watchdog_fired: false,
        }
    }
}

/// Per-probe failure accounting owned by the watchdog.
#[derive(Debug, Clone, Default)]
pub struct FailRecord {
    pub failure_checks: u32,
    pub restart_time: u64,
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_deserializes_documented_wire_shape() {
        let body = r#"{
            "id": "p1", "desc": "checks x", "type": "http_get",
            "urls": ["http://x"], "auth": {"enabled": true, "client": "svc"},
            "timeout": 5, "responseTimeout": 2, "dependentJob": "p0",
            "limit": 1000, "metricName": "p1", "metricLabels": {"env": "prod"}
        }"#;
        let probe: Probe = serde_json::from_str(body).unwrap();
        assert_eq!(probe.description, "checks x");
        assert_eq!(probe.auth, AuthMode::Named("svc".to_string()));
        assert_eq!(probe.timeout_secs, 5);
        assert_eq!(probe.response_timeout_secs, 2);
        assert_eq!(probe.dependent_job.as_deref(), Some("p0"));
        assert_eq!(probe.limit_bytes, 1000);
        assert_eq!(probe.metric_labels.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn auth_disabled_flag_wins_over_stale_client_id() {
        let wire = r#"{"enabled": false, "client": "svc"}"#;
        let mode: AuthMode = {
            #[derive(Deserialize)]
            struct Wrapper(
                #[serde(deserialize_with = "deserialize_auth_mode")] AuthMode,
            );
            let w: Wrapper = serde_json::from_str(wire).unwrap();
            w.0
        };
        assert_eq!(mode, AuthMode::Anonymous);
    }

    #[test]
    fn action_def_deserializes_connectionstring_key() {
        let body = r#"{"id":"a1","type":"redis","connectionstring":"redis://x","cmd":"FLUSHALL"}"#;
        let def: ActionDef = serde_json::from_str(body).unwrap();
        assert_eq!(def.connection_string, "redis://x");
        assert_eq!(def.kind, ActionKind::Redis);
    }
}
