//! Versioned asset caches keyed by request URL.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// A cached response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Request URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

/// A single named cache store.
#[derive(Debug, Default)]
pub struct AssetCache {
    /// Store name, `{app}-{version}`.
    pub name: String,

    entries: HashMap<String, CachedResponse>,
}

impl AssetCache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Look up a request URL.
    pub fn match_url(&self, url: &str) -> Option<&CachedResponse> {
        self.entries.get(url)
    }

    /// Store an entry. An existing entry for the URL is replaced.
    pub fn put(&mut self, entry: CachedResponse) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Delete an entry.
    pub fn delete(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    /// All stored URLs.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The set of named cache stores.
///
/// At most one store is current; every other store is stale and eligible
/// for deletion on activate.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, AssetCache>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut AssetCache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| AssetCache::new(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache wholesale.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All cache names.
    pub fn keys(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// Look up a URL in a specific cache.
    pub fn match_in(&self, cache_name: &str, url: &str) -> Option<&CachedResponse> {
        self.caches.get(cache_name).and_then(|c| c.match_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> CachedResponse {
        CachedResponse {
            url: url.to_string(),
            status: 200,
            headers: HashMap::new(),
            body: b"body".to_vec(),
            cached_at: 0,
        }
    }

    #[test]
    fn test_put_and_match() {
        let mut cache = AssetCache::new("stock-link-v1");
        cache.put(entry("https://shop.example/index.html"));

        assert!(cache.match_url("https://shop.example/index.html").is_some());
        assert!(cache.match_url("https://shop.example/other.html").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_replaces() {
        let mut cache = AssetCache::new("stock-link-v1");
        cache.put(entry("https://shop.example/app.js"));
        let mut newer = entry("https://shop.example/app.js");
        newer.body = b"newer".to_vec();
        cache.put(newer);

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.match_url("https://shop.example/app.js").unwrap().body,
            b"newer"
        );
    }

    #[test]
    fn test_delete_entry() {
        let mut cache = AssetCache::new("stock-link-v1");
        cache.put(entry("https://shop.example/app.js"));
        assert!(cache.delete("https://shop.example/app.js"));
        assert!(!cache.delete("https://shop.example/app.js"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_storage_open_and_delete() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("stock-link-v1"));

        storage.open("stock-link-v1");
        assert!(storage.has("stock-link-v1"));

        assert!(storage.delete("stock-link-v1"));
        assert!(!storage.has("stock-link-v1"));
    }

    #[test]
    fn test_storage_match_in_is_scoped() {
        let mut storage = CacheStorage::new();
        storage
            .open("stock-link-v1")
            .put(entry("https://shop.example/index.html"));

        assert!(storage
            .match_in("stock-link-v1", "https://shop.example/index.html")
            .is_some());
        assert!(storage
            .match_in("stock-link-v2", "https://shop.example/index.html")
            .is_none());
    }
}
