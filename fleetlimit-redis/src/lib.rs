//! Redis bucket store for `fleetlimit` (companion crate).
//! Bring your own `redis::aio::ConnectionManager`; buckets live in hashes under a key prefix.
//!
//! Redis runs each script to completion before serving another command, which
//! is what makes the bucket step atomic across every connected process.
//! Timeouts and reconnects are whatever the connection manager was built with;
//! use `ConnectionManager::new_with_config` to bound how long a call may block.

use async_trait::async_trait;
use fleetlimit::{BucketStore, TOKEN_BUCKET_SCRIPT};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};

/// Configuration for [`RedisBucketStore`].
#[derive(Debug, Clone)]
pub struct RedisBucketStoreConfig {
    /// Prepended to every bucket key (default: "fleetlimit:").
    pub key_prefix: String,
}

impl Default for RedisBucketStoreConfig {
    fn default() -> Self {
        Self { key_prefix: "fleetlimit:".to_string() }
    }
}

/// Shared bucket store backed by Redis.
#[derive(Clone)]
pub struct RedisBucketStore {
    connection: ConnectionManager,
    config: RedisBucketStoreConfig,
    bucket_script: Script,
}

impl std::fmt::Debug for RedisBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucketStore")
            .field("config", &self.config)
            .field("connection", &"<redis::aio::ConnectionManager>")
            .finish()
    }
}

impl RedisBucketStore {
    /// Use an existing connection with the default key prefix.
    pub fn new(connection: ConnectionManager) -> Self {
        Self::with_config(connection, RedisBucketStoreConfig::default())
    }

    /// Use an existing connection with custom configuration.
    pub fn with_config(connection: ConnectionManager, config: RedisBucketStoreConfig) -> Self {
        Self { connection, config, bucket_script: Script::new(TOKEN_BUCKET_SCRIPT) }
    }

    /// Open a managed connection to `url` (e.g. "redis://127.0.0.1/").
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::new(connection))
    }

    /// Redis key holding the bucket for `key`.
    pub fn redis_key(&self, key: &str) -> String {
        prefixed(&self.config.key_prefix, key)
    }
}

fn prefixed(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    type Error = RedisError;

    async fn execute(
        &self,
        script: &str,
        key: &str,
        args: &[String],
    ) -> Result<Vec<i64>, Self::Error> {
        let ad_hoc;
        let script = if script == TOKEN_BUCKET_SCRIPT {
            &self.bucket_script
        } else {
            ad_hoc = Script::new(script);
            &ad_hoc
        };

        let redis_key = self.redis_key(key);
        let mut invocation = script.key(&redis_key);
        for arg in args {
            invocation.arg(arg);
        }

        let mut connection = self.connection.clone();
        invocation.invoke_async(&mut connection).await.map_err(|e| {
            tracing::warn!(
                target: "fleetlimit::redis",
                key = %redis_key,
                error = %e,
                "token bucket script failed"
            );
            e
        })
    }
}
