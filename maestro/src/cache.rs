//! TTL + LRU cache for task outputs, with deterministic task keys.
//!
//! Hits extend the entry's life when sliding expiration is on (the default)
//! and promote it to the MRU position; inserts evict from the LRU end until
//! the size bound holds.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Tuning for one cache.
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    pub sliding_expiration: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl: Duration::from_secs(300),
            sliding_expiration: true,
        }
    }
}

/// Counters exposed by [`TaskCache::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub hit_rate: f64,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// LRU order: front = least recently used.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Cache keyed by [`task_key`] digests.
pub struct TaskCache {
    config: CacheConfig,
    inner: RwLock<Inner>,
}

impl TaskCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Returns the cached value, extending/promoting the entry on a hit.
    /// Expired entries are removed and count as misses.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        let expired = inner.entries.get(key).map(|entry| entry.expires_at <= now);
        match expired {
            None => {
                inner.misses += 1;
                None
            }
            Some(true) => {
                inner.entries.remove(key);
                remove_from_order(&mut inner.order, key);
                inner.misses += 1;
                None
            }
            Some(false) => {
                if self.config.sliding_expiration {
                    if let Some(entry) = inner.entries.get_mut(key) {
                        entry.expires_at = now + self.config.ttl;
                    }
                }
                remove_from_order(&mut inner.order, key);
                inner.order.push_back(key.to_string());
                inner.hits += 1;
                inner.entries.get(key).map(|e| e.value.clone())
            }
        }
    }

    /// Inserts a value, evicting LRU entries until the bound holds.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let mut inner = self.inner.write().await;
        let expires_at = Instant::now() + self.config.ttl;
        let replaced = inner
            .entries
            .insert(
                key.clone(),
                Entry {
                    value: value.into(),
                    expires_at,
                },
            )
            .is_some();
        if replaced {
            remove_from_order(&mut inner.order, &key);
        }
        inner.order.push_back(key);
        while inner.entries.len() > self.config.max_entries {
            let Some(victim) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&victim);
            inner.evictions += 1;
        }
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.order.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        let lookups = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
        }
    }
}

impl Default for TaskCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn remove_from_order(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
}

/// Deterministic cache key: the first 16 hex chars of the SHA-256 of
/// `agent ":" task` (or just `task` without an agent).
pub fn task_key(task: &str, agent: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    if let Some(agent) = agent {
        hasher.update(agent.as_bytes());
        hasher.update(b":");
    }
    hasher.update(task.as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()[..16]
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, ttl_ms: u64, sliding: bool) -> CacheConfig {
        CacheConfig {
            max_entries: max,
            ttl: Duration::from_millis(ttl_ms),
            sliding_expiration: sliding,
        }
    }

    #[test]
    fn task_key_is_pure_and_discriminating() {
        assert_eq!(task_key("do it", Some("coder")), task_key("do it", Some("coder")));
        assert_eq!(task_key("do it", None).len(), 16);
        assert_ne!(task_key("do it", None), task_key("do it", Some("coder")));
        assert_ne!(task_key("do it", Some("a")), task_key("do it", Some("b")));
        assert_ne!(task_key("task one", None), task_key("task two", None));
    }

    #[tokio::test]
    async fn get_set_roundtrip() {
        let cache = TaskCache::default();
        assert_eq!(cache.get("k").await, None);
        cache.set("k", "v").await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn expired_entries_are_removed_on_get() {
        let cache = TaskCache::new(config(10, 20, false));
        cache.set("k", "v").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.stats().await.size, 0);
    }

    #[tokio::test]
    async fn sliding_expiration_extends_on_hit() {
        let cache = TaskCache::new(config(10, 60, true));
        cache.set("k", "v").await;
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(35)).await;
            assert!(cache.get("k").await.is_some(), "entry should have slid");
        }
    }

    #[tokio::test]
    async fn lru_eviction_drops_oldest() {
        let cache = TaskCache::new(config(2, 60_000, true));
        cache.set("a", "1").await;
        cache.set("b", "2").await;
        // Touch "a" so "b" becomes LRU.
        cache.get("a").await;
        cache.set("c", "3").await;

        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("c").await.is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }
}
