//! One remote key-value backend behind a trait.
//!
//! Multiple independent instances form a redundant pool; there is no
//! replication between them. A backend that cannot connect is reported
//! unhealthy and skipped - connection failures never propagate past
//! initialization.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::config::Config;

/// Capability set of a single remote cache/store instance.
///
/// `incr` and the set mutations must be atomic in the backing store; rate
/// limiting and zone membership rely on that with no in-process locking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Verify connectivity. Failures are for the caller to log, not raise.
    async fn connect(&self) -> Result<()>;

    /// Cheap liveness check; may probe the backend if the last operation
    /// failed.
    async fn is_healthy(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value with a TTL in seconds.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;

    /// Delete a batch of keys in one round trip.
    async fn del_many(&self, keys: &[String]) -> Result<()>;

    /// Atomically increment, creating the counter at 1 if absent.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Attach or refresh a TTL on an existing key.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()>;

    /// All keys matching a glob pattern, collected via cursor scans so the
    /// backend is never blocked by one unbounded listing.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    async fn srem(&self, key: &str, member: &str) -> Result<()>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Push to the head of a list and trim it to the most recent `max_len`
    /// entries.
    async fn lpush_capped(&self, key: &str, value: &str, max_len: usize) -> Result<()>;

    /// The first `count` entries from the head of a list (most recent first).
    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>>;

    async fn llen(&self, key: &str) -> Result<i64>;
}

/// Redis implementation of [`KeyValueBackend`].
///
/// Connections are established per operation; the client reconnects
/// transparently after transient outages. A health flag flips false on any
/// failed operation and true on success, so pool iteration skips a backend
/// the moment it misbehaves and readmits it once a probe succeeds.
pub struct RedisBackend {
    client: redis::Client,
    url: String,
    healthy: AtomicBool,
}

impl RedisBackend {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            url: url.to_string(),
            healthy: AtomicBool::new(false),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn conn(&self) -> Result<MultiplexedConnection> {
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => Ok(conn),
            Err(err) => {
                self.healthy.store(false, Ordering::Relaxed);
                Err(err.into())
            }
        }
    }

    fn track<T>(&self, result: redis::RedisResult<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.healthy.store(true, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => {
                self.healthy.store(false, Ordering::Relaxed);
                Err(err.into())
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        self.track(redis::cmd("PING").query_async::<String>(&mut conn).await)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn connect(&self) -> Result<()> {
        self.ping().await
    }

    async fn is_healthy(&self) -> bool {
        if self.healthy.load(Ordering::Relaxed) {
            return true;
        }
        self.ping().await.is_ok()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<String>>(&mut conn)
                .await,
        )
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl_secs)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await,
        )
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut conn)
                .await,
        )
    }

    async fn del_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("DEL")
                .arg(keys)
                .query_async::<()>(&mut conn)
                .await,
        )
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("INCR")
                .arg(key)
                .query_async::<i64>(&mut conn)
                .await,
        )
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs)
                .query_async::<()>(&mut conn)
                .await,
        )
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch) = self.track(
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async::<(u64, Vec<String>)>(&mut conn)
                    .await,
            )?;

            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("SADD")
                .arg(key)
                .arg(member)
                .query_async::<()>(&mut conn)
                .await,
        )
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("SREM")
                .arg(key)
                .arg(member)
                .query_async::<()>(&mut conn)
                .await,
        )
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("SISMEMBER")
                .arg(key)
                .arg(member)
                .query_async::<bool>(&mut conn)
                .await,
        )
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("SMEMBERS")
                .arg(key)
                .query_async::<Vec<String>>(&mut conn)
                .await,
        )
    }

    async fn lpush_capped(&self, key: &str, value: &str, max_len: usize) -> Result<()> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("LPUSH")
                .arg(key)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await,
        )?;
        self.track(
            redis::cmd("LTRIM")
                .arg(key)
                .arg(0)
                .arg(max_len as i64 - 1)
                .query_async::<()>(&mut conn)
                .await,
        )
    }

    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("LRANGE")
                .arg(key)
                .arg(0)
                .arg(count as i64 - 1)
                .query_async::<Vec<String>>(&mut conn)
                .await,
        )
    }

    async fn llen(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        self.track(
            redis::cmd("LLEN")
                .arg(key)
                .query_async::<i64>(&mut conn)
                .await,
        )
    }
}

/// Builds the backend pool from configuration. Backends that are unreachable
/// at startup stay in the pool - they are skipped while unhealthy and
/// readmitted when a later probe succeeds. An empty URL list yields an empty
/// pool, which puts the cache tier in pure fallback mode.
pub async fn connect_backends(config: &Config) -> Vec<Arc<dyn KeyValueBackend>> {
    let mut backends: Vec<Arc<dyn KeyValueBackend>> = Vec::new();

    for url in config.backend_urls() {
        match RedisBackend::new(&url) {
            Ok(backend) => {
                if let Err(err) = backend.connect().await {
                    tracing::warn!(url = %backend.url(), error = %err, "backend unreachable at startup");
                } else {
                    tracing::info!(url = %backend.url(), "backend connected");
                }
                backends.push(Arc::new(backend));
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "invalid backend url, skipping");
            }
        }
    }

    backends
}
