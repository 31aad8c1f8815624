//! Response caching, namespaced per API.
//!
//! Entries are keyed by request [`Fingerprint`] and keep the request's
//! canonical text, so a fingerprint collision is a miss rather than another
//! request's payload. Each entry carries its own TTL. An
//! entry is never served once `now > stored_at + ttl`; expired entries are
//! removed lazily on read, by [`ResponseCache::purge_expired`], or when a full
//! namespace needs room.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_core::clock::elapsed;
use gateway_core::{ApiId, ApiRequest, Fingerprint};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default bound on entries per namespace
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// A cached response entry
#[derive(Debug, Clone)]
struct CacheEntry {
    canonical: String,
    value: serde_json::Value,
    stored_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        elapsed(self.stored_at, now) > self.ttl
    }
}

/// Cache statistics for one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses (including expired entries)
    pub misses: u64,
    /// Current number of entries
    pub entries: usize,
    /// Number of evictions
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// One API's entries
#[derive(Debug)]
struct Namespace {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Namespace {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Make room for one more entry: expired entries go first, then the oldest
    fn evict(&self, entries: &mut HashMap<Fingerprint, CacheEntry>, now: DateTime<Utc>) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed_expired = before - entries.len();

        if entries.len() >= self.max_entries {
            let to_remove = entries.len() + 1 - self.max_entries;
            let mut by_age: Vec<(Fingerprint, DateTime<Utc>)> =
                entries.iter().map(|(k, v)| (*k, v.stored_at)).collect();
            by_age.sort_by_key(|(_, stored_at)| *stored_at);

            for (key, _) in by_age.into_iter().take(to_remove) {
                entries.remove(&key);
            }
        }

        let removed = before - entries.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);

        if removed > 0 {
            info!(removed_expired, removed_total = removed, "Cache eviction completed");
        }
    }
}

/// Response cache with one namespace per API
pub struct ResponseCache {
    /// Entry bound per API; APIs without an entry use the default
    max_entries: HashMap<ApiId, usize>,
    namespaces: DashMap<ApiId, Arc<Namespace>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_entries: HashMap::new(),
            namespaces: DashMap::new(),
        }
    }

    /// Bound the number of entries kept for one API
    #[must_use]
    pub fn with_max_entries(mut self, api: ApiId, max_entries: usize) -> Self {
        self.max_entries.insert(api, max_entries);
        self
    }

    fn namespace(&self, api: ApiId) -> Arc<Namespace> {
        let entry = self.namespaces.entry(api).or_insert_with(|| {
            let max = self.max_entries.get(&api).copied().unwrap_or(DEFAULT_MAX_ENTRIES);
            Arc::new(Namespace::new(max))
        });
        Arc::clone(entry.value())
    }

    /// Look up a live entry for a request
    pub fn get(&self, api: ApiId, request: &ApiRequest, now: DateTime<Utc>) -> Option<serde_json::Value> {
        let canonical = request.canonical();
        self.lookup(api, Fingerprint::of_canonical(&canonical), &canonical, now)
    }

    fn lookup(
        &self,
        api: ApiId,
        key: Fingerprint,
        canonical: &str,
        now: DateTime<Utc>,
    ) -> Option<serde_json::Value> {
        let ns = self.namespace(api);

        {
            let entries = ns.entries.read();
            match entries.get(&key) {
                Some(entry) if entry.canonical != canonical => {
                    ns.misses.fetch_add(1, Ordering::Relaxed);
                    debug!(api = %api, key = %key, "Cache miss (fingerprint collision)");
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    ns.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(api = %api, key = %key, "Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    ns.misses.fetch_add(1, Ordering::Relaxed);
                    debug!(api = %api, key = %key, "Cache miss");
                    return None;
                }
            }
        }

        // Expired: drop it unless a concurrent put already replaced it
        let mut entries = ns.entries.write();
        if entries.get(&key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(&key);
        }
        ns.misses.fetch_add(1, Ordering::Relaxed);
        debug!(api = %api, key = %key, "Cache miss (expired)");
        None
    }

    /// Store a response for a request, replacing any previous entry for its
    /// fingerprint
    pub fn put(
        &self,
        api: ApiId,
        request: &ApiRequest,
        value: serde_json::Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        let canonical = request.canonical();
        let key = Fingerprint::of_canonical(&canonical);
        self.store(api, key, canonical, value, ttl, now);
    }

    fn store(
        &self,
        api: ApiId,
        key: Fingerprint,
        canonical: String,
        value: serde_json::Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        let ns = self.namespace(api);
        let mut entries = ns.entries.write();

        if !entries.contains_key(&key) && entries.len() >= ns.max_entries {
            ns.evict(&mut entries, now);
        }

        entries.insert(
            key,
            CacheEntry {
                canonical,
                value,
                stored_at: now,
                ttl,
            },
        );

        debug!(
            api = %api,
            key = %key,
            ttl_ms = ttl.as_millis() as u64,
            entries = entries.len(),
            "Response cached"
        );
    }

    /// Remove a request's entry; returns whether it existed
    pub fn invalidate(&self, api: ApiId, request: &ApiRequest) -> bool {
        let canonical = request.canonical();
        let key = Fingerprint::of_canonical(&canonical);
        let ns = self.namespace(api);
        let mut entries = ns.entries.write();
        if entries.get(&key).is_some_and(|entry| entry.canonical == canonical) {
            entries.remove(&key);
            true
        } else {
            false
        }
    }

    /// Remove every entry for an API; returns how many were removed
    pub fn invalidate_api(&self, api: ApiId) -> usize {
        let ns = self.namespace(api);
        let mut entries = ns.entries.write();
        let removed = entries.len();
        entries.clear();
        info!(api = %api, removed, "Cache namespace invalidated");
        removed
    }

    /// Sweep expired entries from every namespace; returns how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let namespaces: Vec<Arc<Namespace>> =
            self.namespaces.iter().map(|entry| Arc::clone(entry.value())).collect();

        namespaces
            .iter()
            .map(|ns| {
                let mut entries = ns.entries.write();
                let before = entries.len();
                entries.retain(|_, entry| !entry.is_expired(now));
                before - entries.len()
            })
            .sum()
    }

    /// Number of stored entries for an API, expired or not
    #[must_use]
    pub fn len(&self, api: ApiId) -> usize {
        self.namespaces
            .get(&api)
            .map_or(0, |ns| ns.entries.read().len())
    }

    /// Check if an API's namespace is empty
    #[must_use]
    pub fn is_empty(&self, api: ApiId) -> bool {
        self.len(api) == 0
    }

    /// Statistics for an API's namespace
    #[must_use]
    pub fn stats(&self, api: ApiId) -> CacheStats {
        self.namespaces.get(&api).map_or_else(CacheStats::default, |ns| CacheStats {
            hits: ns.hits.load(Ordering::Relaxed),
            misses: ns.misses.load(Ordering::Relaxed),
            entries: ns.entries.read().len(),
            evictions: ns.evictions.load(Ordering::Relaxed),
        })
    }
}
