//! Repository traits describing persistence adapters.

use std::cmp::Ordering;
use std::num::NonZeroU32;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{ContentItem, SiteRecord, TaxonomyTerm};
use crate::domain::types::Taxonomy;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("content store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("database timeout")]
    Timeout,
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Slice of the content store requested by the sitemap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchScope {
    /// Items modified at or after `since`, at most `limit` of them.
    RecentWindow { since: OffsetDateTime, limit: u32 },
    /// The `number`-th page (1-based) of `size` items.
    Page { number: NonZeroU32, size: NonZeroU32 },
    /// Every item, capped at `limit`.
    All { limit: u32 },
    /// Only the total count; no items are materialized.
    CountOnly,
}

impl FetchScope {
    /// Offset and limit for the ordered enumeration, if the scope returns items.
    pub fn window(&self) -> Option<(u64, u64)> {
        match *self {
            FetchScope::RecentWindow { limit, .. } | FetchScope::All { limit } => {
                Some((0, u64::from(limit)))
            }
            FetchScope::Page { number, size } => {
                let size = u64::from(size.get());
                Some((size * (u64::from(number.get()) - 1), size))
            }
            FetchScope::CountOnly => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentPage {
    pub items: Vec<ContentItem>,
    /// Number of items matching the scope before the window was applied.
    pub total_count: u64,
}

/// Sitemap ordering: newest modification first, identifier descending on ties.
pub fn sitemap_order(a: &ContentItem, b: &ContentItem) -> Ordering {
    b.modified_at
        .cmp(&a.modified_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn fetch(&self, scope: FetchScope) -> Result<ContentPage, RepoError>;

    /// Most recent modification across every eligible item.
    async fn latest_modified(&self) -> Result<Option<OffsetDateTime>, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait TaxonomyRepo: Send + Sync {
    async fn list_terms(&self, taxonomy: Taxonomy) -> Result<Vec<TaxonomyTerm>, RepoError>;
}

#[async_trait]
pub trait SiteRegistry: Send + Sync {
    /// Member sites of a multi-site install; empty on single-site installs.
    async fn list_sites(&self) -> Result<Vec<SiteRecord>, RepoError>;
}
