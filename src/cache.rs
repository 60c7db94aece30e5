//! # Result Cache
//!
//! Fingerprint-keyed store of cacheable task results with a TTL and a size bound.
//! Non-cacheable results are never stored, so a side-effecting task always reaches
//! the compute backend. Entries are tagged with their experiment so that every
//! result computed against an experiment can be dropped once its cell sets change.

use crate::config::CacheConfig;
use crate::models::TaskResult;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedResult {
    experiment_id: String,
    result: TaskResult,
    cached_at: Instant,
}

#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<String, CachedResult>,
    ttl: Duration,
    max_size: usize,
    enabled: bool,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_seconds),
            max_size: config.max_size,
            enabled: config.enabled,
        }
    }

    pub fn disabled() -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::ZERO,
            max_size: 0,
            enabled: false,
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<TaskResult> {
        if !self.enabled {
            return None;
        }

        let expired = match self.entries.get(fingerprint) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                debug!(fingerprint = %fingerprint, "Cache hit");
                return Some(entry.result.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(fingerprint);
        }
        debug!(fingerprint = %fingerprint, "Cache miss");
        None
    }

    /// Store a result under its own fingerprint. Returns whether it was stored.
    pub fn insert(&self, experiment_id: &str, result: &TaskResult) -> bool {
        if !self.enabled || !result.cacheable {
            return false;
        }

        if self.entries.len() >= self.max_size && !self.entries.contains_key(&result.fingerprint) {
            self.evict_oldest();
        }

        self.entries.insert(
            result.fingerprint.clone(),
            CachedResult {
                experiment_id: experiment_id.to_string(),
                result: result.clone(),
                cached_at: Instant::now(),
            },
        );
        debug!(fingerprint = %result.fingerprint, "Cached result");
        true
    }

    /// Drop every result computed for `experiment_id`. Returns how many were dropped.
    pub fn invalidate_experiment(&self, experiment_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.experiment_id != experiment_id);
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            debug!(experiment_id = %experiment_id, dropped = dropped, "Invalidated cached results");
        }
        dropped
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        self.entries.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        if self.entries.len() < self.max_size {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.cached_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            debug!(fingerprint = %key, "Evicting oldest cached result");
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(max_size: usize) -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl_seconds: 3600,
            max_size,
        }
    }

    #[test]
    fn test_cacheable_results_are_returned_by_fingerprint() {
        let cache = ResultCache::new(&config(10));
        let result = TaskResult::new(json!({"0": 0.1}), true, "fp-1");

        assert!(cache.insert("e1", &result));
        assert_eq!(cache.get("fp-1"), Some(result));
        assert_eq!(cache.get("fp-2"), None);
    }

    #[test]
    fn test_non_cacheable_results_are_never_stored() {
        let cache = ResultCache::new(&config(10));
        let result = TaskResult::new(json!({}), false, "fp-1");

        assert!(!cache.insert("e1", &result));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = ResultCache::disabled();
        assert!(!cache.insert("e1", &TaskResult::new(json!(1), true, "fp")));
        assert_eq!(cache.get("fp"), None);
    }

    #[test]
    fn test_expired_entries_are_dropped_on_read() {
        let cache = ResultCache::new(&CacheConfig {
            enabled: true,
            ttl_seconds: 0,
            max_size: 10,
        });
        cache.insert("e1", &TaskResult::new(json!(1), true, "fp"));

        assert_eq!(cache.get("fp"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidation_is_scoped_to_one_experiment() {
        let cache = ResultCache::new(&config(10));
        cache.insert("e1", &TaskResult::new(json!(1), true, "a"));
        cache.insert("e1", &TaskResult::new(json!(2), true, "b"));
        cache.insert("e2", &TaskResult::new(json!(3), true, "c"));

        assert_eq!(cache.invalidate_experiment("e1"), 2);
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("c").is_some());
        assert_eq!(cache.invalidate_experiment("e1"), 0);
    }

    #[test]
    fn test_size_bound_evicts_the_oldest_entry() {
        let cache = ResultCache::new(&config(2));
        cache.insert("e1", &TaskResult::new(json!(1), true, "a"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("e1", &TaskResult::new(json!(2), true, "b"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("e1", &TaskResult::new(json!(3), true, "c"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("c").is_some());
    }
}
