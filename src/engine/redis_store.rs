//! Redis-backed counter store.
//!
//! Executes the bundled Lua procedure via `EVALSHA`. The script identifier is
//! taken from settings (key `script:ratelimit`) when provisioned, otherwise
//! the script is registered with `SCRIPT LOAD` once and the sha cached in
//! process. A `NOSCRIPT` response triggers a single re-registration followed
//! by one re-issue of the call; the failed call never executed, so this
//! cannot double-count.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::ErrorKind;
use tracing::{debug, info};

use crate::error::Result;
use crate::limits::model::RateLimitResult;
use crate::settings::{SettingsStore, SCRIPT_KEY};

use super::store::{CounterStore, ProcedureArgs};

/// The atomic procedure source, shipped with the crate.
const RATE_LIMIT_SCRIPT: &str = include_str!("ratelimit.lua");

/// Counter store backed by a shared Redis instance.
pub struct RedisCounterStore {
    connection: ConnectionManager,
    settings: Arc<dyn SettingsStore>,
    /// Sha of the registered procedure, filled on first use
    script_sha: RwLock<Option<String>>,
}

impl RedisCounterStore {
    /// Connect to the store at `url`.
    pub async fn connect(url: &str, settings: Arc<dyn SettingsStore>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            settings,
            script_sha: RwLock::new(None),
        })
    }

    /// Resolve the procedure identifier: settings first, then the in-process
    /// cache, then registration.
    async fn script_sha(&self) -> Result<String> {
        if let Some(sha) = self.settings.string(SCRIPT_KEY) {
            if !sha.trim().is_empty() {
                debug!(sha = %sha, "Using provisioned rate limit script sha");
                return Ok(sha);
            }
        }

        if let Some(sha) = self.script_sha.read().clone() {
            return Ok(sha);
        }

        self.register_script().await
    }

    /// Load the procedure into the store and cache its identifier.
    async fn register_script(&self) -> Result<String> {
        let mut connection = self.connection.clone();

        info!("Registering rate limit script");
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(RATE_LIMIT_SCRIPT)
            .query_async(&mut connection)
            .await?;

        *self.script_sha.write() = Some(sha.clone());
        Ok(sha)
    }

    async fn eval_sha(&self, sha: &str, keys: &[String], payload: &str) -> redis::RedisResult<String> {
        let mut connection = self.connection.clone();

        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(keys.len());
        for key in keys {
            cmd.arg(key);
        }
        cmd.arg(payload);

        cmd.query_async(&mut connection).await
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn execute(&self, keys: &[String], args: &ProcedureArgs) -> Result<RateLimitResult> {
        let payload = serde_json::to_string(args)?;
        let sha = self.script_sha().await?;

        let raw = match self.eval_sha(&sha, keys, &payload).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NoScriptError => {
                // The store lost the procedure (flush or restart). Register
                // once and re-issue; the counting call itself is never
                // retried beyond this.
                debug!("Rate limit script not registered, re-registering");
                let sha = self.register_script().await?;
                self.eval_sha(&sha, keys, &payload).await?
            }
            Err(e) => return Err(e.into()),
        };

        let result: RateLimitResult = serde_json::from_str(&raw)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_declares_no_external_state() {
        // The procedure must derive everything from KEYS/ARGV so that the
        // store can execute it with exclusivity.
        assert!(RATE_LIMIT_SCRIPT.contains("KEYS[i]"));
        assert!(RATE_LIMIT_SCRIPT.contains("cjson.decode(ARGV[1])"));
        assert!(!RATE_LIMIT_SCRIPT.contains("redis.call('TIME'"));
    }

    #[test]
    fn test_script_sets_expiry_on_first_hit_only() {
        assert!(RATE_LIMIT_SCRIPT.contains("if current == 1 then"));
        assert!(RATE_LIMIT_SCRIPT.contains("redis.call('EXPIRE', KEYS[i], w.seconds)"));
    }
}
