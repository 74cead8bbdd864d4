//! Shared test utilities.
//!
//! `InMemoryBackend` is a full [`KeyValueBackend`] over process-local maps
//! with a simulated clock, so tests can drive whole cache and presence flows
//! (including TTL expiry) without a running Redis. Targeted interaction
//! tests use the generated `MockKeyValueBackend` instead.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::models::UserProfile;
use crate::stores::KeyValueBackend;

pub fn profile(username: &str) -> UserProfile {
    UserProfile {
        username: username.to_string(),
        gender: "F".to_string(),
    }
}

enum Stored {
    Text(String),
    Counter(i64),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

struct Entry {
    value: Stored,
    expires_at: Option<u64>,
}

/// In-memory backend with a manually advanced clock (in whole seconds).
pub struct InMemoryBackend {
    healthy: AtomicBool,
    clock: Mutex<u64>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            clock: Mutex::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A backend that reports itself dead; operations still work, mirroring
    /// a node that answers probes late but is already excluded from pools.
    pub fn unhealthy() -> Self {
        let backend = Self::new();
        backend.healthy.store(false, Ordering::Relaxed);
        backend
    }

    pub fn advance(&self, by: Duration) {
        *self.clock.lock().unwrap() += by.as_secs();
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, u64) -> T) -> T {
        let now = *self.clock.lock().unwrap();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, entry| entry.expires_at.is_none_or(|at| at > now));
        f(&mut entries, now)
    }
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries, _| match entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Stored::Text(text) => Ok(Some(text.clone())),
                Stored::Counter(count) => Ok(Some(count.to_string())),
                _ => Err(anyhow!("WRONGTYPE")),
            },
        })
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Stored::Text(value.to_string()),
                    expires_at: Some(now + ttl_secs),
                },
            );
        });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.with_entries(|entries, _| {
            entries.remove(key);
        });
        Ok(())
    }

    async fn del_many(&self, keys: &[String]) -> Result<()> {
        self.with_entries(|entries, _| {
            for key in keys {
                entries.remove(key);
            }
        });
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.with_entries(|entries, _| match entries.get_mut(key) {
            Some(Entry {
                value: Stored::Counter(count),
                ..
            }) => {
                *count += 1;
                Ok(*count)
            }
            Some(_) => Err(anyhow!("WRONGTYPE")),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Stored::Counter(1),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        self.with_entries(|entries, now| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(now + ttl_secs);
            }
        });
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.with_entries(|entries, _| {
            let keys = entries
                .keys()
                .filter(|key| match pattern.strip_suffix('*') {
                    Some(prefix) => key.starts_with(prefix),
                    None => key.as_str() == pattern,
                })
                .cloned()
                .collect();
            Ok(keys)
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.with_entries(|entries, _| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Stored::Set(HashSet::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Stored::Set(set) => {
                    set.insert(member.to_string());
                    Ok(())
                }
                _ => Err(anyhow!("WRONGTYPE")),
            }
        })
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        self.with_entries(|entries, _| {
            if let Some(Entry {
                value: Stored::Set(set),
                ..
            }) = entries.get_mut(key)
            {
                set.remove(member);
            }
            Ok(())
        })
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.with_entries(|entries, _| match entries.get(key) {
            Some(Entry {
                value: Stored::Set(set),
                ..
            }) => Ok(set.contains(member)),
            _ => Ok(false),
        })
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.with_entries(|entries, _| match entries.get(key) {
            Some(Entry {
                value: Stored::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        })
    }

    async fn lpush_capped(&self, key: &str, value: &str, max_len: usize) -> Result<()> {
        self.with_entries(|entries, _| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Stored::List(VecDeque::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Stored::List(list) => {
                    list.push_front(value.to_string());
                    list.truncate(max_len);
                    Ok(())
                }
                _ => Err(anyhow!("WRONGTYPE")),
            }
        })
    }

    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>> {
        self.with_entries(|entries, _| match entries.get(key) {
            Some(Entry {
                value: Stored::List(list),
                ..
            }) => Ok(list.iter().take(count).cloned().collect()),
            _ => Ok(Vec::new()),
        })
    }

    async fn llen(&self, key: &str) -> Result<i64> {
        self.with_entries(|entries, _| match entries.get(key) {
            Some(Entry {
                value: Stored::List(list),
                ..
            }) => Ok(list.len() as i64),
            _ => Ok(0),
        })
    }
}
