//! Classification of inbound requests into sitemap variants.

use std::fmt;
use std::num::NonZeroU32;

use time::OffsetDateTime;
use url::form_urlencoded;

const FULL_SUFFIX: &str = "sitemap-all.xml";
const INDEX_SUFFIX: &str = "sitemapindex.xml";
const PLAIN_MARKER: &str = "sitemap.xml";

/// Explicit per-request inputs for sitemap resolution.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub path: String,
    pub query: Option<String>,
    pub now: OffsetDateTime,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, query: Option<&str>, now: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            query: query.map(str::to_string),
            now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    PlainSitemap,
    SitemapPage(NonZeroU32),
    FullSitemap,
    SitemapIndex,
    NotApplicable,
}

impl RouteMatch {
    pub fn is_sitemap(self) -> bool {
        !matches!(self, RouteMatch::NotApplicable)
    }
}

impl fmt::Display for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMatch::PlainSitemap => f.write_str("plain"),
            RouteMatch::SitemapPage(n) => write!(f, "page:{n}"),
            RouteMatch::FullSitemap => f.write_str("all"),
            RouteMatch::SitemapIndex => f.write_str("index"),
            RouteMatch::NotApplicable => f.write_str("none"),
        }
    }
}

/// Classifies a request. Precedence: full sitemap, index, then the plain or
/// paginated sitemap. Pure; no side effects.
pub fn resolve(ctx: &RequestContext) -> RouteMatch {
    let (path, inline_query) = match ctx.path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (ctx.path.as_str(), None),
    };

    if path.ends_with(FULL_SUFFIX) {
        return RouteMatch::FullSitemap;
    }
    if path.ends_with(INDEX_SUFFIX) {
        return RouteMatch::SitemapIndex;
    }
    if path.contains(PLAIN_MARKER) {
        let query = ctx.query.as_deref().or(inline_query);
        return match query.and_then(page_parameter) {
            Some(page) => RouteMatch::SitemapPage(page),
            None => RouteMatch::PlainSitemap,
        };
    }
    RouteMatch::NotApplicable
}

/// Parses `page` permissively: anything other than a positive integer counts as absent.
fn page_parameter(query: &str) -> Option<NonZeroU32> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.trim().parse::<u32>().ok())
        .and_then(NonZeroU32::new)
}
