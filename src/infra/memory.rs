//! In-process content store used by tests and local demos.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    ContentPage, ContentRepo, FetchScope, RepoError, SiteRegistry, TaxonomyRepo, sitemap_order,
};
use crate::domain::entities::{ContentItem, SiteRecord, TaxonomyTerm};
use crate::domain::types::Taxonomy;

/// Holds eligible items only; callers add what would be published.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<Vec<ContentItem>>,
    terms: RwLock<Vec<TaxonomyTerm>>,
    sites: RwLock<Vec<SiteRecord>>,
    queries: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = ContentItem>) -> Self {
        let store = Self::new();
        for item in items {
            store.upsert_item(item);
        }
        store
    }

    /// Inserts or replaces the item with the same id.
    pub fn upsert_item(&self, item: ContentItem) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
    }

    pub fn remove_item(&self, id: Uuid) -> Option<ContentItem> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let position = items.iter().position(|item| item.id == id)?;
        Some(items.remove(position))
    }

    pub fn add_term(&self, term: TaxonomyTerm) {
        self.terms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(term);
    }

    pub fn add_site(&self, site: SiteRecord) {
        self.sites
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(site);
    }

    /// Makes every subsequent call fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of store calls served so far, failed ones included.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn begin_query(&self) -> Result<(), RepoError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn ordered_items(&self) -> Vec<ContentItem> {
        let mut items = self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        items.sort_by(sitemap_order);
        items
    }
}

#[async_trait]
impl ContentRepo for InMemoryStore {
    async fn fetch(&self, scope: FetchScope) -> Result<ContentPage, RepoError> {
        self.begin_query()?;
        let mut items = self.ordered_items();
        if let FetchScope::RecentWindow { since, .. } = scope {
            items.retain(|item| item.modified_at >= since);
        }
        let total_count = items.len() as u64;

        let items = match scope.window() {
            Some((offset, limit)) => items
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => Vec::new(),
        };

        Ok(ContentPage { items, total_count })
    }

    async fn latest_modified(&self) -> Result<Option<OffsetDateTime>, RepoError> {
        self.begin_query()?;
        Ok(self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|item| item.modified_at)
            .max())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.begin_query()
    }
}

#[async_trait]
impl TaxonomyRepo for InMemoryStore {
    async fn list_terms(&self, taxonomy: Taxonomy) -> Result<Vec<TaxonomyTerm>, RepoError> {
        self.begin_query()?;
        let mut terms: Vec<TaxonomyTerm> = self
            .terms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|term| term.taxonomy == taxonomy)
            .cloned()
            .collect();
        terms.sort_by(|a, b| a.slug.cmp(&b.slug).then_with(|| a.id.cmp(&b.id)));
        Ok(terms)
    }
}

#[async_trait]
impl SiteRegistry for InMemoryStore {
    async fn list_sites(&self) -> Result<Vec<SiteRecord>, RepoError> {
        self.begin_query()?;
        Ok(self
            .sites
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
