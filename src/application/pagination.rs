//! Pagination planning for the sitemap index and numbered sitemap pages.

use std::num::NonZeroU32;

use time::OffsetDateTime;

/// One `<sitemap>` reference inside the sitemap index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapIndexEntry {
    pub loc: String,
    pub lastmod: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapIndexPlan {
    pub root_entry: SitemapIndexEntry,
    pub page_entries: Vec<SitemapIndexEntry>,
    pub total_count: u64,
    pub page_size: NonZeroU32,
}

impl SitemapIndexPlan {
    pub fn page_count(&self) -> u64 {
        self.page_entries.len() as u64
    }

    /// Root entry followed by the page entries, in document order.
    pub fn entries(&self) -> impl Iterator<Item = &SitemapIndexEntry> {
        std::iter::once(&self.root_entry).chain(self.page_entries.iter())
    }
}

pub fn page_count(total_count: u64, page_size: NonZeroU32) -> u64 {
    total_count.div_ceil(u64::from(page_size.get()))
}

/// Whether page `number` holds at least one item.
pub fn page_in_range(number: NonZeroU32, total_count: u64, page_size: NonZeroU32) -> bool {
    u64::from(page_size.get()) * (u64::from(number.get()) - 1) < total_count
}

pub fn page_url(sitemap_url: &str, number: u64) -> String {
    format!("{sitemap_url}?page={number}")
}

/// Builds the index plan. Every entry carries the same site-wide `lastmod`.
pub fn plan(
    sitemap_url: &str,
    total_count: u64,
    page_size: NonZeroU32,
    lastmod: Option<OffsetDateTime>,
) -> SitemapIndexPlan {
    let pages = page_count(total_count, page_size);
    let page_entries = (1..=pages)
        .map(|number| SitemapIndexEntry {
            loc: page_url(sitemap_url, number),
            lastmod,
        })
        .collect();

    SitemapIndexPlan {
        root_entry: SitemapIndexEntry {
            loc: sitemap_url.to_string(),
            lastmod,
        },
        page_entries,
        total_count,
        page_size,
    }
}
