//! Multi-backend cache fan-out with in-process fallback.
//!
//! Reads take the first hit from the healthy backends in configured order;
//! writes go to all of them best-effort. Backends may diverge after partial
//! failures - availability is chosen over consistency, and reads are never
//! reconciled. The in-memory fallback activates only when zero backends are
//! healthy.
//!
//! No operation here surfaces an infrastructure error: cache-tier outages
//! degrade to the fallback or to a miss, forcing the caller to recompute.
//! The one exception is [`CacheManager::get_or_set`], which propagates
//! errors from the injected fetch - store failures must not be masked.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::backend::KeyValueBackend;
use super::fallback::FallbackStore;

/// Keys deleted per round trip during pattern clears.
const DEL_BATCH: usize = 500;

/// Cache operations across a redundant backend pool.
pub struct CacheManager {
    backends: Vec<Arc<dyn KeyValueBackend>>,
    fallback: FallbackStore,
}

/// Snapshot of the cache tier for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// "redis" when at least one backend is healthy, "memory" otherwise.
    pub tier: &'static str,
    pub backends: usize,
    pub healthy: usize,
    pub fallback_entries: usize,
}

impl CacheManager {
    pub fn new(backends: Vec<Arc<dyn KeyValueBackend>>) -> Self {
        Self {
            backends,
            fallback: FallbackStore::new(),
        }
    }

    async fn healthy_backends(&self) -> Vec<Arc<dyn KeyValueBackend>> {
        let mut healthy = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            if backend.is_healthy().await {
                healthy.push(backend.clone());
            }
        }
        healthy
    }

    /// First non-absent hit across the healthy backends, in configured
    /// order; later backends are not consulted once one hits. Falls through
    /// to the in-memory store when every backend misses or none is healthy.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        for (idx, backend) in self.healthy_backends().await.iter().enumerate() {
            match backend.get(key).await {
                Ok(Some(json)) => match serde_json::from_str(&json) {
                    Ok(value) => return Some(value),
                    Err(err) => {
                        tracing::warn!(key = %key, backend = idx, error = %err, "cached value failed to deserialize, trying next backend");
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(key = %key, backend = idx, error = %err, "backend get failed, trying next backend");
                }
            }
        }

        let json = self.fallback.get(key)?;
        serde_json::from_str(&json).ok()
    }

    /// Writes to every healthy backend concurrently, best-effort: a failed
    /// write is logged and the others proceed. Only with zero healthy
    /// backends does the value land in the in-memory store instead.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(key = %key, error = %err, "value failed to serialize, not cached");
                return;
            }
        };

        let healthy = self.healthy_backends().await;
        if healthy.is_empty() {
            self.fallback.set(key, json, ttl_secs);
            return;
        }

        let json = &json;
        let writes = healthy.iter().enumerate().map(|(idx, backend)| async move {
            if let Err(err) = backend.set(key, json, ttl_secs).await {
                tracing::warn!(key = %key, backend = idx, error = %err, "backend set failed");
            }
        });
        futures::future::join_all(writes).await;
    }

    /// Deletes from every healthy backend, and always from the in-memory
    /// store - if a backend later drops out, the fallback must not serve a
    /// value that was deleted while backends were up.
    pub async fn del(&self, key: &str) {
        let healthy = self.healthy_backends().await;
        let deletes = healthy.iter().enumerate().map(|(idx, backend)| async move {
            if let Err(err) = backend.del(key).await {
                tracing::warn!(key = %key, backend = idx, error = %err, "backend del failed");
            }
        });
        futures::future::join_all(deletes).await;

        self.fallback.del(key);
    }

    /// Increments on the first backend that accepts the command - counters
    /// are never fanned out, or windows would double-count. A count of 1
    /// means the window was just created, so the TTL is attached on that
    /// same backend. The in-memory counter is used only when every backend
    /// attempt fails.
    pub async fn incr(&self, key: &str, ttl_secs: u64) -> i64 {
        for (idx, backend) in self.healthy_backends().await.iter().enumerate() {
            match backend.incr(key).await {
                Ok(count) => {
                    if count == 1
                        && let Err(err) = backend.expire(key, ttl_secs).await
                    {
                        tracing::warn!(key = %key, backend = idx, error = %err, "failed to attach window ttl");
                    }
                    return count;
                }
                Err(err) => {
                    tracing::warn!(key = %key, backend = idx, error = %err, "backend incr failed, trying next backend");
                }
            }
        }

        self.fallback.incr(key, ttl_secs)
    }

    /// Scan-and-delete matching keys on every healthy backend, in batches so
    /// no backend blocks on one unbounded listing. The in-memory store is
    /// cleared entirely, pattern ignored.
    pub async fn clear_pattern(&self, pattern: &str) {
        for (idx, backend) in self.healthy_backends().await.iter().enumerate() {
            match backend.scan_keys(pattern).await {
                Ok(keys) => {
                    for batch in keys.chunks(DEL_BATCH) {
                        if let Err(err) = backend.del_many(batch).await {
                            tracing::warn!(pattern = %pattern, backend = idx, error = %err, "batched delete failed");
                            break;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(pattern = %pattern, backend = idx, error = %err, "backend scan failed");
                }
            }
        }

        self.fallback.clear();
    }

    /// Read-through cache: on a miss, runs the injected fetch, caches a
    /// present result and returns it. Fetch errors propagate to the caller
    /// uncached; absent results are returned but never cached.
    ///
    /// Concurrent misses on the same key may each invoke the fetch - there
    /// is no single-flight de-duplication.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, ttl_secs: u64, fetch: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(Some(cached));
        }

        let fetched = fetch().await?;

        if let Some(value) = &fetched {
            self.set(key, value, ttl_secs).await;
        }

        Ok(fetched)
    }

    pub async fn stats(&self) -> CacheStats {
        let healthy = self.healthy_backends().await.len();
        CacheStats {
            tier: if healthy > 0 { "redis" } else { "memory" },
            backends: self.backends.len(),
            healthy,
            fallback_entries: self.fallback.len(),
        }
    }
}
