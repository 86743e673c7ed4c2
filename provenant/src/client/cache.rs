//! TTL cache for idempotent remote responses.
//!
//! Keys are scoped by the upstream registry's release token, so a new
//! release never serves stale entries under the same key space. Lookups
//! happen before rate-limit token acquisition; hits consume no rate budget.

use crate::config::CacheConfig;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct CacheEntry {
    payload: serde_json::Value,
    expires_at: Instant,
}

/// Shared, read-mostly response cache.
///
/// Concurrent writers to the same key are last-writer-wins; entries are
/// derived data, never authoritative.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    /// Creates a cache from the configured TTL.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            enabled: config.enabled,
        }
    }

    /// Builds the cache key for a request.
    ///
    /// Parameters are sorted so equivalent requests share a key regardless of
    /// construction order.
    #[must_use]
    pub fn key(endpoint: &str, params: &[(String, String)], release: &str) -> String {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();
        let query: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{endpoint}?{}@{release}", query.join("&"))
    }

    /// Returns whether caching is enabled at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Gets a live entry, removing it if expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if !self.enabled {
            return None;
        }
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.payload.clone());
            }
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    /// Stores a successful response payload.
    pub fn put(&self, key: String, payload: serde_json::Value) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Number of live-or-expired entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            enabled: true,
            ttl_secs,
        })
    }

    #[test]
    fn key_is_order_insensitive_and_release_scoped() {
        let a = ResponseCache::key(
            "uniprot",
            &[
                ("fields".to_string(), "accession".to_string()),
                ("size".to_string(), "25".to_string()),
            ],
            "2025_04",
        );
        let b = ResponseCache::key(
            "uniprot",
            &[
                ("size".to_string(), "25".to_string()),
                ("fields".to_string(), "accession".to_string()),
            ],
            "2025_04",
        );
        assert_eq!(a, b);

        let c = ResponseCache::key(
            "uniprot",
            &[("fields".to_string(), "accession".to_string())],
            "2025_05",
        );
        assert_ne!(a, c);
    }

    #[test]
    fn put_get_round_trip() {
        let cache = cache(60);
        assert!(cache.get("k").is_none());

        cache.put("k".to_string(), serde_json::json!({"accession": "P12345"}));
        assert_eq!(
            cache.get("k").unwrap()["accession"],
            serde_json::json!("P12345")
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_expire_by_ttl() {
        let cache = cache(0);
        cache.put("k".to_string(), serde_json::json!(1));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = ResponseCache::new(&CacheConfig {
            enabled: false,
            ttl_secs: 60,
        });
        cache.put("k".to_string(), serde_json::json!(1));
        assert!(cache.get("k").is_none());
        assert!(!cache.is_enabled());
    }
}
