//! TTL response cache for successful GET requests.
//!
//! Keys are method + path + sorted query string. Request headers and
//! bodies are not part of the key, so the cache is not aware of content
//! negotiation; routes whose output depends on the caller must answer
//! with `Cache-Control: no-store`.
//!
//! Each collection prefix carries an invalidation generation. A miss
//! records it before running the handler and only stores the response if
//! no write invalidated the collection in the meantime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use dashmap::DashMap;
use url::form_urlencoded;

use crate::config::CacheConfig;
use crate::lifecycle::{Sweeper, SweeperSlot};
use crate::observability::Metrics;

/// Identity of a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    path: String,
    query: String,
}

impl CacheKey {
    pub fn new(method: &Method, uri: &Uri) -> Self {
        Self {
            method: method.clone(),
            path: uri.path().to_string(),
            query: normalize_query(uri.query().unwrap_or_default()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Sort query pairs so `?b=2&a=1` and `?a=1&b=2` share an entry.
fn normalize_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// A stored response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug)]
struct CacheEntry {
    response: CachedResponse,
    expires_at: Instant,
    generation: u64,
}

/// Concurrent TTL cache of GET responses.
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
    generations: DashMap<String, u64>,
    ttl: Duration,
    max_body_bytes: usize,
    sweep_interval: Duration,
    pub(crate) sweeper: SweeperSlot,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            max_body_bytes: config.max_body_bytes,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            sweeper: SweeperSlot::new(),
        }
    }

    /// Cache with the given TTL and default sweep settings.
    pub fn with_ttl(ttl: Duration) -> Self {
        let mut cache = Self::new(&CacheConfig::default());
        cache.ttl = ttl;
        cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Fetch a live entry. Expired entries are removed and reported as a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.response.clone());
            }
        }

        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    /// Current invalidation generation of the collection holding `path`.
    pub fn generation(&self, path: &str) -> u64 {
        self.generations
            .get(&resource_prefix(path))
            .map_or(0, |g| *g)
    }

    /// Store `response` under `key` for `ttl`, unless the collection was
    /// invalidated after `generation` was read. Returns whether it was kept.
    pub fn store(
        &self,
        key: CacheKey,
        response: CachedResponse,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        if self.generation(&key.path) != generation {
            return false;
        }

        self.entries.insert(
            key.clone(),
            CacheEntry {
                response,
                expires_at: Instant::now() + ttl,
                generation,
            },
        );

        // An invalidation that raced the insert may have run its sweep
        // before the entry existed.
        if self.generation(&key.path) != generation {
            self.entries
                .remove_if(&key, |_, entry| entry.generation == generation);
            return false;
        }
        true
    }

    /// Drop every entry at `prefix` or below it and advance the
    /// collection's generation so in-flight misses are not stored.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let prefix = prefix.trim_end_matches('/');
        *self
            .generations
            .entry(resource_prefix(prefix))
            .or_insert(0) += 1;

        let before = self.entries.len();
        self.entries.retain(|key, _| {
            let below = key
                .path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
            !below
        });
        before.saturating_sub(self.entries.len())
    }

    /// Drop every expired entry.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the periodic expiry sweep. Idempotent.
    pub fn start(self: &Arc<Self>, metrics: Arc<Metrics>) {
        self.sweeper.start_with(|| {
            Sweeper::spawn(
                "response_cache",
                self,
                self.sweep_interval,
                move |cache: Arc<ResponseCache>| {
                    let metrics = metrics.clone();
                    async move {
                        let removed = cache.evict_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Evicted expired cache entries");
                            metrics.record_sweep("response_cache", removed as u64);
                        }
                    }
                },
            )
        });
    }

    /// Stop the sweep and wait for it to exit.
    pub async fn stop(&self, grace: Duration) {
        self.sweeper.stop(grace).await;
    }
}

/// Collection root used for write invalidation: `/api/v1/ideas/7` → `/api/v1/ideas`.
pub fn resource_prefix(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let depth = if segments.first() == Some(&"api") { 3 } else { 1 };
    let root: Vec<&str> = segments.into_iter().take(depth).collect();
    format!("/{}", root.join("/"))
}
