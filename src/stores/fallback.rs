//! Process-local store used when no backend is reachable.
//!
//! Values are serialized JSON strings, the same representation the backends
//! hold, so the cache tier reads either source identically. Expired entries
//! are evicted lazily on read - there is no background sweep.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct ValueEntry {
    json: String,
    written_at: Instant,
    ttl: Duration,
}

struct CounterEntry {
    count: i64,
    expires_at: Instant,
}

/// In-memory fallback with per-key expiry and fixed-window counters.
///
/// Counter TTLs are set once at window creation and never refreshed by
/// subsequent increments; a read after expiry observes a fresh window, not a
/// continuation.
#[derive(Default)]
pub struct FallbackStore {
    values: Mutex<HashMap<String, ValueEntry>>,
    counters: Mutex<HashMap<String, CounterEntry>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut values = locked(&self.values);

        let expired = match values.get(key) {
            Some(entry) => now.duration_since(entry.written_at) > entry.ttl,
            None => return None,
        };

        if expired {
            values.remove(key);
            return None;
        }

        values.get(key).map(|entry| entry.json.clone())
    }

    pub fn set(&self, key: &str, json: String, ttl_secs: u64) {
        self.set_at(key, json, ttl_secs, Instant::now());
    }

    pub(crate) fn set_at(&self, key: &str, json: String, ttl_secs: u64, now: Instant) {
        locked(&self.values).insert(
            key.to_string(),
            ValueEntry {
                json,
                written_at: now,
                ttl: Duration::from_secs(ttl_secs),
            },
        );
    }

    pub fn del(&self, key: &str) {
        locked(&self.values).remove(key);
        locked(&self.counters).remove(key);
    }

    pub fn incr(&self, key: &str, ttl_secs: u64) -> i64 {
        self.incr_at(key, ttl_secs, Instant::now())
    }

    pub(crate) fn incr_at(&self, key: &str, ttl_secs: u64, now: Instant) -> i64 {
        let mut counters = locked(&self.counters);

        match counters.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.count += 1;
                entry.count
            }
            _ => {
                counters.insert(
                    key.to_string(),
                    CounterEntry {
                        count: 1,
                        expires_at: now + Duration::from_secs(ttl_secs.max(1)),
                    },
                );
                1
            }
        }
    }

    /// Drops every value and counter. Pattern clears are coarse here: the
    /// fallback is only populated while backends are down, so over-clearing
    /// costs a recompute, never a stale read.
    pub fn clear(&self) {
        locked(&self.values).clear();
        locked(&self.counters).clear();
    }

    pub fn len(&self) -> usize {
        locked(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
