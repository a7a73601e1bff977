//! Sitemap service: resolves a request to a variant, serves it from the cache
//! or renders it from the content store, and augments `robots.txt`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use bytes::Bytes;
use metrics::histogram;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument, warn};

use crate::application::document::{DebugInfo, DocumentBuilder, DocumentError, RenderStamp};
use crate::application::pagination;
use crate::application::repos::{
    ContentPage, ContentRepo, FetchScope, RepoError, SiteRegistry, TaxonomyRepo,
};
use crate::application::routing::{RequestContext, resolve};
use crate::cache::{CachedDocument, ContentClock, SitemapCache, SitemapKey};
use crate::domain::entities::{SiteProfile, TaxonomyTerm};
use crate::domain::types::Taxonomy;
use crate::util::http_date::format_http_date;

const METRIC_RENDER_MS: &str = "sitemapper_render_ms";

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error(transparent)]
    Store(#[from] RepoError),
    #[error("sitemap page {page} has no items")]
    NoMatchingItems { page: u32 },
    #[error("failed to encode sitemap: {0}")]
    Encoding(String),
    #[error("failed to render template: {0}")]
    Template(String),
}

impl From<DocumentError> for SitemapError {
    fn from(err: DocumentError) -> Self {
        SitemapError::Encoding(err.to_string())
    }
}

/// Tunables from the `[sitemap]` settings table.
#[derive(Debug, Clone, Copy)]
pub struct SitemapOptions {
    pub page_size: NonZeroU32,
    pub recent_window: Duration,
    pub max_urls: u32,
    pub debug_info: bool,
}

impl Default for SitemapOptions {
    fn default() -> Self {
        Self {
            page_size: NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN),
            recent_window: Duration::days(7),
            max_urls: 50_000,
            debug_info: false,
        }
    }
}

/// Service for generating sitemap documents and robots.txt.
#[derive(Clone)]
pub struct SitemapService {
    content: Arc<dyn ContentRepo>,
    taxonomy: Arc<dyn TaxonomyRepo>,
    sites: Arc<dyn SiteRegistry>,
    site: SiteProfile,
    options: SitemapOptions,
    builder: DocumentBuilder,
    cache: Option<Arc<SitemapCache>>,
    clock: Arc<ContentClock>,
}

/// Counts store round trips for the debug attribute.
#[derive(Default)]
struct QueryTally(AtomicU32);

impl QueryTally {
    fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn total(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl SitemapService {
    pub fn new(
        content: Arc<dyn ContentRepo>,
        taxonomy: Arc<dyn TaxonomyRepo>,
        sites: Arc<dyn SiteRegistry>,
        site: SiteProfile,
        options: SitemapOptions,
        cache: Option<Arc<SitemapCache>>,
    ) -> Self {
        let builder = DocumentBuilder::new(&site);
        Self {
            content,
            taxonomy,
            sites,
            site,
            options,
            builder,
            cache,
            clock: Arc::new(ContentClock::new()),
        }
    }

    pub fn site(&self) -> &SiteProfile {
        &self.site
    }

    pub fn cache(&self) -> Option<&Arc<SitemapCache>> {
        self.cache.as_ref()
    }

    /// Clock advanced by content mutations; feeds `Last-Modified`.
    pub fn clock(&self) -> Arc<ContentClock> {
        Arc::clone(&self.clock)
    }

    /// Serves the document for `ctx`, or `Ok(None)` when the request is not
    /// for a sitemap. Failed renders leave the cache untouched.
    #[instrument(skip_all, fields(path = %ctx.path))]
    pub async fn serve(&self, ctx: &RequestContext) -> Result<Option<CachedDocument>, SitemapError> {
        let route = resolve(ctx);
        let Some(key) = SitemapKey::from_route(route) else {
            return Ok(None);
        };

        if let Some(cache) = &self.cache
            && let Some(document) = cache.get(key)
        {
            debug!(cache = "sitemap", outcome = "hit", variant = %key, "serving cached sitemap");
            return Ok(Some(document));
        }
        debug!(cache = "sitemap", outcome = "miss", variant = %key, "rendering sitemap");

        let generation = self.cache.as_ref().map(|cache| cache.generation());
        let document = self.render(key, ctx.now).await?;
        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            cache.put_if_current(key, document.clone(), generation);
        }
        Ok(Some(document))
    }

    /// Renders one variant straight from the store.
    pub async fn render(
        &self,
        key: SitemapKey,
        now: OffsetDateTime,
    ) -> Result<CachedDocument, SitemapError> {
        let started = Instant::now();
        let tally = QueryTally::default();

        tally.bump();
        let site_modified = self.content.latest_modified().await?;

        let body = match key {
            SitemapKey::Recent => {
                let since = now - self.options.recent_window;
                let page = self
                    .fetch(
                        &tally,
                        FetchScope::RecentWindow {
                            since,
                            limit: self.options.max_urls,
                        },
                    )
                    .await?;
                let terms = self.taxonomy_terms(&tally).await?;
                let stamp = self.stamp(now, &tally, started);
                self.builder
                    .build_urlset(&page.items, true, &terms, &stamp)?
            }
            SitemapKey::Page(number) => {
                let number =
                    NonZeroU32::new(number).ok_or(SitemapError::NoMatchingItems { page: number })?;
                let page = self
                    .fetch(
                        &tally,
                        FetchScope::Page {
                            number,
                            size: self.options.page_size,
                        },
                    )
                    .await?;
                if page.items.is_empty()
                    || !pagination::page_in_range(number, page.total_count, self.options.page_size)
                {
                    return Err(SitemapError::NoMatchingItems { page: number.get() });
                }
                let stamp = self.stamp(now, &tally, started);
                self.builder.build_urlset(&page.items, false, &[], &stamp)?
            }
            SitemapKey::All => {
                let page = self
                    .fetch(
                        &tally,
                        FetchScope::All {
                            limit: self.options.max_urls,
                        },
                    )
                    .await?;
                if page.total_count > u64::from(self.options.max_urls) {
                    warn!(
                        total = page.total_count,
                        max_urls = self.options.max_urls,
                        "Full sitemap truncated at the per-document URL ceiling"
                    );
                }
                let stamp = self.stamp(now, &tally, started);
                self.builder.build_urlset(&page.items, false, &[], &stamp)?
            }
            SitemapKey::Index => {
                let counted = self.fetch(&tally, FetchScope::CountOnly).await?;
                let plan = pagination::plan(
                    &self.site.sitemap_url(),
                    counted.total_count,
                    self.options.page_size,
                    site_modified,
                );
                let stamp = self.stamp(now, &tally, started);
                self.builder.build_sitemapindex(&plan, &stamp)?
            }
        };

        histogram!(METRIC_RENDER_MS, "variant" => key.label())
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let last_modified = match (site_modified, self.clock.last_change()) {
            (Some(stored), Some(changed)) => Some(stored.max(changed)),
            (stored, changed) => stored.or(changed),
        };

        Ok(CachedDocument {
            body: Bytes::from(body),
            last_modified: last_modified.and_then(format_http_date),
        })
    }

    /// Appends `Sitemap:` lines to the platform's robots.txt output.
    #[instrument(skip_all)]
    pub async fn robots_txt(&self, existing: &str) -> Result<String, SitemapError> {
        let sites = self.sites.list_sites().await?;

        let urls: Vec<String> = if sites.is_empty() {
            if self.site.public {
                vec![self.site.sitemap_index_url(), self.site.sitemap_url()]
            } else {
                Vec::new()
            }
        } else {
            sites
                .iter()
                .filter(|site| site.is_visible())
                .flat_map(|site| {
                    [
                        site.document_url("sitemapindex.xml"),
                        site.document_url("sitemap.xml"),
                    ]
                })
                .collect()
        };

        let mut output = existing.to_string();
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        for url in urls {
            output.push_str("Sitemap: ");
            output.push_str(&url);
            output.push('\n');
        }
        Ok(output)
    }

    async fn fetch(&self, tally: &QueryTally, scope: FetchScope) -> Result<ContentPage, RepoError> {
        tally.bump();
        self.content.fetch(scope).await
    }

    async fn taxonomy_terms(&self, tally: &QueryTally) -> Result<Vec<TaxonomyTerm>, RepoError> {
        let mut terms = Vec::new();
        for taxonomy in [Taxonomy::Category, Taxonomy::Tag] {
            tally.bump();
            terms.extend(self.taxonomy.list_terms(taxonomy).await?);
        }
        Ok(terms)
    }

    fn stamp(&self, now: OffsetDateTime, tally: &QueryTally, started: Instant) -> RenderStamp {
        let stamp = RenderStamp::new(now);
        if self.options.debug_info {
            stamp.with_debug(DebugInfo {
                queries: tally.total(),
                elapsed: started.elapsed(),
            })
        } else {
            stamp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheTrigger, ContentEvent};
    use crate::domain::entities::{ContentItem, SiteRecord};
    use crate::domain::types::ContentKind;
    use crate::infra::memory::InMemoryStore;
    use crate::util::http_date::parse_http_date;
    use async_trait::async_trait;
    use time::macros::datetime;
    use uuid::Uuid;

    const NOW: OffsetDateTime = datetime!(2024-06-10 12:00 UTC);

    fn site(public: bool) -> SiteProfile {
        SiteProfile::new("https://example.com", "Example", "en", chrono_tz::UTC, public)
            .expect("site profile")
    }

    fn item(n: u128, modified: OffsetDateTime) -> ContentItem {
        ContentItem {
            id: Uuid::from_u128(n),
            kind: ContentKind::Post,
            permalink: format!("https://example.com/item-{n}/"),
            title: format!("Item {n}"),
            published_at: modified,
            modified_at: modified,
            image: None,
        }
    }

    fn service_with(
        store: &Arc<InMemoryStore>,
        site: SiteProfile,
        options: SitemapOptions,
    ) -> SitemapService {
        let cache = Arc::new(SitemapCache::new(
            "xml_sitemap:https://example.com/sitemap.xml",
            &CacheConfig::default(),
        ));
        SitemapService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            site,
            options,
            Some(cache),
        )
    }

    fn service(store: &Arc<InMemoryStore>) -> SitemapService {
        service_with(store, site(true), SitemapOptions::default())
    }

    async fn body(service: &SitemapService, path: &str, query: Option<&str>) -> String {
        let document = service
            .serve(&RequestContext::new(path, query, NOW))
            .await
            .expect("serve")
            .expect("sitemap route");
        String::from_utf8(document.body.to_vec()).expect("utf-8 body")
    }

    #[tokio::test]
    async fn recent_view_keeps_only_the_last_week() {
        let store = Arc::new(InMemoryStore::with_items([
            item(1, NOW - Duration::days(10)),
            item(2, NOW - Duration::days(1)),
        ]));
        store.add_term(TaxonomyTerm {
            id: Uuid::from_u128(90),
            taxonomy: Taxonomy::Category,
            slug: "news".to_string(),
            link: "https://example.com/category/news/".to_string(),
        });

        let xml = body(&service(&store), "/sitemap.xml", None).await;
        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(xml.contains("https://example.com/item-2/"));
        assert!(!xml.contains("https://example.com/item-1/"));
        assert!(xml.contains("https://example.com/category/news/"));
    }

    #[tokio::test]
    async fn non_numeric_page_falls_back_to_recent_view() {
        let store = Arc::new(InMemoryStore::with_items([item(1, NOW - Duration::days(1))]));
        let xml = body(&service(&store), "/sitemap.xml", Some("page=abc")).await;
        assert!(xml.contains("<changefreq>always</changefreq>"));
    }

    #[tokio::test]
    async fn page_past_the_end_is_no_matching_items() {
        let base = datetime!(2024-01-01 00:00 UTC);
        let store = Arc::new(InMemoryStore::with_items(
            (1..=250u128).map(|n| item(n, base + Duration::minutes(n as i64))),
        ));
        let service = service(&store);

        let result = service
            .serve(&RequestContext::new("/sitemap.xml", Some("page=4"), NOW))
            .await;
        assert!(matches!(result, Err(SitemapError::NoMatchingItems { page: 4 })));
        assert!(service.cache().is_some_and(|cache| cache.is_empty()));

        let xml = body(&service, "/sitemap.xml", Some("page=3")).await;
        assert_eq!(xml.matches("<url>").count(), 50);
        assert!(!xml.contains("<changefreq>"));
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let store = Arc::new(InMemoryStore::with_items([item(1, NOW - Duration::days(1))]));
        let service = service(&store);

        let first = body(&service, "/sitemapindex.xml", None).await;
        let queries = store.query_count();
        let second = body(&service, "/sitemapindex.xml", None).await;

        assert_eq!(first, second);
        assert_eq!(store.query_count(), queries);
    }

    /// Content repo whose fetch races with a content mutation.
    struct InvalidatingRepo {
        inner: Arc<InMemoryStore>,
        cache: Arc<SitemapCache>,
    }

    #[async_trait]
    impl ContentRepo for InvalidatingRepo {
        async fn fetch(&self, scope: FetchScope) -> Result<ContentPage, RepoError> {
            let page = self.inner.fetch(scope).await;
            self.cache.invalidate_all();
            page
        }

        async fn latest_modified(&self) -> Result<Option<OffsetDateTime>, RepoError> {
            self.inner.latest_modified().await
        }

        async fn health_check(&self) -> Result<(), RepoError> {
            self.inner.health_check().await
        }
    }

    #[tokio::test]
    async fn render_overtaken_by_invalidation_is_not_cached() {
        let store = Arc::new(InMemoryStore::with_items([item(1, NOW - Duration::days(1))]));
        let cache = Arc::new(SitemapCache::new("ns", &CacheConfig::default()));
        let content = Arc::new(InvalidatingRepo {
            inner: store.clone(),
            cache: cache.clone(),
        });
        let service = SitemapService::new(
            content,
            store.clone(),
            store.clone(),
            site(true),
            SitemapOptions::default(),
            Some(cache.clone()),
        );

        let served = service
            .serve(&RequestContext::new("/sitemap-all.xml", None, NOW))
            .await
            .expect("serve");
        assert!(served.is_some());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn deleting_the_newest_item_advances_last_modified() {
        let base = datetime!(2024-01-01 00:00 UTC);
        let store = Arc::new(InMemoryStore::with_items(
            (1..=250u128).map(|n| item(n, base + Duration::minutes(n as i64))),
        ));
        let service = service(&store);
        let trigger = CacheTrigger::new(service.cache().cloned(), service.clock());
        let ctx = RequestContext::new("/sitemap.xml", Some("page=2"), NOW);

        let before = service.serve(&ctx).await.expect("serve").expect("route");
        assert_eq!(
            before.last_modified.as_deref(),
            Some("Mon, 01 Jan 2024 04:10:00 GMT")
        );

        store.remove_item(Uuid::from_u128(250));
        trigger.content_changed(ContentEvent::Deleted {
            id: Uuid::from_u128(250),
        });

        let after = service.serve(&ctx).await.expect("serve").expect("route");
        assert_ne!(before.body, after.body);
        let stamp = |document: &CachedDocument| {
            document
                .last_modified
                .as_deref()
                .and_then(parse_http_date)
                .expect("last-modified")
        };
        assert!(stamp(&after) > stamp(&before));
    }

    #[tokio::test]
    async fn store_failure_leaves_cache_untouched() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let service = service(&store);

        let result = service
            .serve(&RequestContext::new("/sitemap-all.xml", None, NOW))
            .await;
        assert!(matches!(
            result,
            Err(SitemapError::Store(RepoError::StoreUnavailable(_)))
        ));
        assert!(service.cache().is_some_and(|cache| cache.is_empty()));
    }

    #[tokio::test]
    async fn index_lists_root_and_every_page() {
        let base = datetime!(2024-01-01 00:00 UTC);
        let store = Arc::new(InMemoryStore::with_items(
            (1..=250u128).map(|n| item(n, base + Duration::minutes(n as i64))),
        ));
        let service = service(&store);

        let document = service
            .serve(&RequestContext::new("/sitemapindex.xml", None, NOW))
            .await
            .expect("serve")
            .expect("sitemap route");
        let xml = String::from_utf8(document.body.to_vec()).expect("utf-8");

        assert_eq!(xml.matches("<sitemap>").count(), 4);
        assert!(xml.contains("<loc>https://example.com/sitemap.xml</loc>"));
        assert!(xml.contains("https://example.com/sitemap.xml?page=3"));
        assert!(!xml.contains("page=4"));
        assert_eq!(
            document.last_modified.as_deref(),
            Some("Mon, 01 Jan 2024 04:10:00 GMT")
        );
    }

    #[tokio::test]
    async fn full_sitemap_is_capped() {
        let store = Arc::new(InMemoryStore::with_items(
            (1..=5u128).map(|n| item(n, NOW - Duration::days(30))),
        ));
        let options = SitemapOptions {
            max_urls: 3,
            ..SitemapOptions::default()
        };
        let service = service_with(&store, site(true), options);

        let xml = body(&service, "/sitemap-all.xml", None).await;
        assert_eq!(xml.matches("<url>").count(), 3);
    }

    #[tokio::test]
    async fn debug_attribute_only_when_enabled() {
        let store = Arc::new(InMemoryStore::new());
        let plain = body(&service(&store), "/sitemap-all.xml", None).await;
        assert!(!plain.contains("debug="));

        let options = SitemapOptions {
            debug_info: true,
            ..SitemapOptions::default()
        };
        let debug = body(
            &service_with(&store, site(true), options),
            "/sitemap-all.xml",
            None,
        )
        .await;
        assert!(debug.contains("debug=\"queries=2;"));
    }

    #[tokio::test]
    async fn unrelated_paths_are_not_served() {
        let store = Arc::new(InMemoryStore::new());
        let served = service(&store)
            .serve(&RequestContext::new("/about/", None, NOW))
            .await
            .expect("serve");
        assert!(served.is_none());
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn robots_lists_index_then_plain_sitemap() {
        let store = Arc::new(InMemoryStore::new());
        let robots = service(&store)
            .robots_txt("User-agent: *\nDisallow:")
            .await
            .expect("robots");
        assert_eq!(
            robots,
            "User-agent: *\nDisallow:\n\
             Sitemap: https://example.com/sitemapindex.xml\n\
             Sitemap: https://example.com/sitemap.xml\n"
        );
    }

    #[tokio::test]
    async fn robots_is_untouched_for_private_sites() {
        let store = Arc::new(InMemoryStore::new());
        let service = service_with(&store, site(false), SitemapOptions::default());
        let robots = service.robots_txt("User-agent: *\n").await.expect("robots");
        assert_eq!(robots, "User-agent: *\n");
    }

    #[tokio::test]
    async fn robots_advertises_visible_member_sites() {
        let store = Arc::new(InMemoryStore::new());
        let member = |domain: &str, archived: bool| SiteRecord {
            domain: domain.to_string(),
            path: "/".to_string(),
            public: true,
            archived,
            spam: false,
            deleted: false,
        };
        store.add_site(member("one.example.com", false));
        store.add_site(member("two.example.com", true));

        let robots = service(&store).robots_txt("").await.expect("robots");
        assert_eq!(
            robots,
            "Sitemap: http://one.example.com/sitemapindex.xml\n\
             Sitemap: http://one.example.com/sitemap.xml\n"
        );
    }
}
