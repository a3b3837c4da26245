//! Configuration loading and validation.
//!
//! Mirrors the teacher crate's `load_config`: read bytes, parse, wrap every
//! fallible step with `anyhow::Context`. Unlike the teacher, only JSON is
//! accepted — the external interface this crate exposes is `config.json`,
//! not a format-sniffing loader.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::model::{ActionDef, AuthMode, Probe};

#[derive(Debug, Clone, Deserialize)]
pub struct AuthClientConfig {
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WatchdogConfig {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

impl WatchdogConfig {
    pub fn is_disabled(&self) -> bool {
        self.namespace.is_empty() && self.actions.is_empty()
    }
}

/// Wire shape: exactly what `serde_json` sees in `config.json`.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default, rename = "authenticationClients")]
    authentication_clients: HashMap<String, AuthClientConfig>,
    jobs: Vec<Probe>,
    #[serde(default)]
    watchdog: WatchdogConfig,
    #[serde(default, rename = "loglevel")]
    log_level: Option<String>,
    #[serde(default)]
    listen_addr: Option<String>,
}

/// Validated domain shape the rest of the program consumes.
#[derive(Debug, Clone)]
pub struct Config {
    pub authentication_clients: HashMap<String, AuthClientConfig>,
    pub jobs: Vec<Probe>,
    pub watchdog: WatchdogConfig,
    pub log_level: Option<String>,
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .with_context(|| format!("failed to read config file {:?}", path_ref))?;
    let raw: RawConfig =
        serde_json::from_slice(&bytes).context("failed to parse JSON config")?;
    validate(raw)
}

fn validate(raw: RawConfig) -> Result<Config> {
    if raw.jobs.is_empty() {
        bail!("config has no jobs configured; at least one probe is required");
    }

    let mut seen_ids = std::collections::HashSet::new();
    let action_ids: std::collections::HashSet<&str> =
        raw.watchdog.actions.iter().map(|a| a.id.as_str()).collect();

    for job in &raw.jobs {
        if !seen_ids.insert(job.id.as_str()) {
            bail!("duplicate probe id {:?}", job.id);
        }
        if let AuthMode::Named(client_id) = &job.auth {
            if !raw.authentication_clients.contains_key(client_id) {
                bail!(
                    "probe {:?} references unknown authentication client {:?}",
                    job.id,
                    client_id
                );
            }
        }
        for action_id in &job.watchdog_action.actions {
            if !action_ids.contains(action_id.as_str()) {
                bail!(
                    "probe {:?} references unknown watchdog action {:?}",
                    job.id,
                    action_id
                );
            }
        }
    }

    for job in &raw.jobs {
        if let Some(dep) = &job.dependent_job {
            if !dep.is_empty() && !seen_ids.contains(dep.as_str()) {
                bail!(
                    "probe {:?} has dependent_job {:?} which does not match any probe id",
                    job.id,
                    dep
                );
            }
        }
    }

    Ok(Config {
        authentication_clients: raw.authentication_clients,
        jobs: raw.jobs,
        watchdog: raw.watchdog,
        log_level: raw.log_level,
        listen_addr: raw.listen_addr.unwrap_or_else(default_listen_addr),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn rejects_empty_jobs() {
        let f = write_config(r#"{"jobs":[]}"#);
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("no jobs"));
    }

    #[test]
    fn rejects_unknown_auth_client() {
        let body = r#"{
            "jobs": [{
                "id": "p1", "type": "http_get", "urls": ["http://x"],
                "auth": {"enabled": true, "client": "missing"},
                "timeout": 5, "metricName": "p1"
            }]
        }"#;
        let f = write_config(body);
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("unknown authentication client"));
    }

    #[test]
    fn disabled_watchdog_has_no_namespace_or_actions() {
        let wd = WatchdogConfig::default();
        assert!(wd.is_disabled());
    }

    #[test]
    fn accepts_minimal_valid_config() {
        let body = r#"{
            "jobs": [{
                "id": "p1", "type": "http_get", "urls": ["http://x"],
                "timeout": 5, "metricName": "p1"
            }]
        }"#;
        let f = write_config(body);
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.jobs.len(), 1);
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn rejects_unknown_watchdog_action_id() {
        let body = r#"{
            "jobs": [{
                "id": "p1", "type": "http_get", "urls": ["http://x"],
                "timeout": 5, "metricName": "p1",
                "watchdog_action": {"enabled": true, "actions": ["missing"], "failureThreshold": 1}
            }]
        }"#;
        let f = write_config(body);
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("unknown watchdog action"));
    }
}
