//! Cache client: a narrow trait over the single remediation command this
//! system issues (`FLUSHALL`), grounded on `cmd/redis/redis.go`.

use anyhow::{Context, Result};
use async_trait::async_trait;

pub const CMD_FLUSHALL: &str = "FLUSHALL";

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn execute(&self, connection_string: &str, cmd: &str) -> Result<()>;
}

pub struct RedisCacheClient;

impl RedisCacheClient {
    pub fn new() -> Self {
        RedisCacheClient
    }
}

impl Default for RedisCacheClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheClient for RedisCacheClient {
    async fn execute(&self, connection_string: &str, cmd: &str) -> Result<()> {
        let client = redis::Client::open(connection_string)
            .with_context(|| format!("invalid redis connection string {:?}", connection_string))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to redis")?;
        match cmd {
            CMD_FLUSHALL => {
                let _: () = redis::cmd("FLUSHALL")
                    .query_async(&mut conn)
                    .await
                    .context("FLUSHALL failed")?;
                Ok(())
            }
            other => anyhow::bail!("unsupported redis command {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingCache {
        calls: std::sync::Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CacheClient for RecordingCache {
        async fn execute(&self, connection_string: &str, cmd: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((connection_string.to_string(), cmd.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn recording_fake_captures_calls() {
        let fake = RecordingCache {
            calls: std::sync::Mutex::new(Vec::new()),
        };
        fake.execute("redis://localhost", CMD_FLUSHALL)
            .await
            .unwrap();
        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "FLUSHALL");
    }
}
