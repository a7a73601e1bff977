//! In-process storage for rendered sitemap documents.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::SitemapKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

const METRIC_HIT: &str = "sitemapper_cache_hit_total";
const METRIC_MISS: &str = "sitemapper_cache_miss_total";
const METRIC_EVICT: &str = "sitemapper_cache_evict_total";
const METRIC_INVALIDATE: &str = "sitemapper_cache_invalidate_total";

/// A rendered document plus the HTTP metadata computed alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDocument {
    pub body: Bytes,
    /// IMF-fixdate value for the `Last-Modified` header, when known.
    pub last_modified: Option<String>,
}

/// Sitemap document cache for one site namespace.
///
/// Reads take the shared lock and do not touch recency; concurrent misses for
/// the same key may both render and the last `put` wins.
pub struct SitemapCache {
    namespace: String,
    documents: RwLock<LruCache<SitemapKey, CachedDocument>>,
    generation: AtomicU64,
}

impl SitemapCache {
    pub fn new(namespace: impl Into<String>, config: &CacheConfig) -> Self {
        Self {
            namespace: namespace.into(),
            documents: RwLock::new(LruCache::new(config.capacity_non_zero())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully qualified key, as it appears in logs.
    pub fn qualified(&self, key: SitemapKey) -> String {
        format!("{}#{}", self.namespace, key)
    }

    pub fn get(&self, key: SitemapKey) -> Option<CachedDocument> {
        let cached = rw_read(&self.documents, SOURCE, "get").peek(&key).cloned();
        match cached {
            Some(document) => {
                counter!(METRIC_HIT, "variant" => key.label()).increment(1);
                Some(document)
            }
            None => {
                counter!(METRIC_MISS, "variant" => key.label()).increment(1);
                None
            }
        }
    }

    pub fn put(&self, key: SitemapKey, document: CachedDocument) {
        let mut documents = rw_write(&self.documents, SOURCE, "put");
        self.insert(&mut documents, key, document);
    }

    /// Stores `document` only if no invalidation happened since `generation`
    /// was read. Returns whether the document was stored.
    pub fn put_if_current(
        &self,
        key: SitemapKey,
        document: CachedDocument,
        generation: u64,
    ) -> bool {
        let mut documents = rw_write(&self.documents, SOURCE, "put_if_current");
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(
                cache = "sitemap",
                key = %self.qualified(key),
                "discarding sitemap rendered before the last invalidation"
            );
            return false;
        }
        self.insert(&mut documents, key, document);
        true
    }

    /// Counter bumped by every [`invalidate_all`](Self::invalidate_all).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Drops every document in the namespace.
    pub fn invalidate_all(&self) -> usize {
        let mut documents = rw_write(&self.documents, SOURCE, "invalidate_all");
        self.generation.fetch_add(1, Ordering::AcqRel);
        let cleared = documents.len();
        documents.clear();
        counter!(METRIC_INVALIDATE).increment(1);
        cleared
    }

    fn insert(
        &self,
        documents: &mut LruCache<SitemapKey, CachedDocument>,
        key: SitemapKey,
        document: CachedDocument,
    ) {
        let evicted = documents.push(key, document);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_EVICT).increment(1);
            debug!(
                cache = "sitemap",
                evicted = %self.qualified(evicted_key),
                "evicted cached sitemap document"
            );
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.documents, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
