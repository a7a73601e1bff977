//! Cache key definitions.

use std::fmt;

use crate::application::routing::RouteMatch;

/// One cache slot per sitemap variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SitemapKey {
    /// `/sitemap.xml` without a page number (recent window).
    Recent,
    /// `/sitemap.xml?page=N`.
    Page(u32),
    /// `/sitemap-all.xml`.
    All,
    /// `/sitemapindex.xml`.
    Index,
}

impl SitemapKey {
    pub fn from_route(route: RouteMatch) -> Option<Self> {
        match route {
            RouteMatch::PlainSitemap => Some(SitemapKey::Recent),
            RouteMatch::SitemapPage(page) => Some(SitemapKey::Page(page.get())),
            RouteMatch::FullSitemap => Some(SitemapKey::All),
            RouteMatch::SitemapIndex => Some(SitemapKey::Index),
            RouteMatch::NotApplicable => None,
        }
    }

    /// Low-cardinality label for metrics.
    pub fn label(self) -> &'static str {
        match self {
            SitemapKey::Recent => "recent",
            SitemapKey::Page(_) => "page",
            SitemapKey::All => "all",
            SitemapKey::Index => "index",
        }
    }
}

impl fmt::Display for SitemapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SitemapKey::Recent => f.write_str("sitemap"),
            SitemapKey::Page(page) => write!(f, "sitemap:page:{page}"),
            SitemapKey::All => f.write_str("sitemap-all"),
            SitemapKey::Index => f.write_str("sitemapindex"),
        }
    }
}

/// Namespace shared by every key of one site.
pub fn namespace_for(sitemap_url: &str) -> String {
    format!("xml_sitemap:{sitemap_url}")
}
