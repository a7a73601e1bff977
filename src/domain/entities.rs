//! Domain entities mirrored from persistent storage.

use chrono_tz::Tz;
use serde::Serialize;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::domain::{
    error::DomainError,
    types::{ContentKind, Taxonomy},
};

/// Featured image attached to a content item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemImage {
    pub url: String,
    pub title: String,
    pub caption: String,
}

/// One publishable unit as seen by the sitemap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub kind: ContentKind,
    pub permalink: String,
    pub title: String,
    pub published_at: OffsetDateTime,
    pub modified_at: OffsetDateTime,
    pub image: Option<ItemImage>,
}

impl ContentItem {
    /// Checks that the permalink is an absolute http(s) URL and that the
    /// modification time does not precede publication.
    pub fn validate(&self) -> Result<(), DomainError> {
        ensure_absolute_http(&self.permalink)?;
        if self.modified_at < self.published_at {
            return Err(DomainError::invariant(format!(
                "content item {} modified before it was published",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxonomyTerm {
    pub id: Uuid,
    pub taxonomy: Taxonomy,
    pub slug: String,
    pub link: String,
}

/// Member of a multi-site registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRecord {
    pub domain: String,
    pub path: String,
    pub public: bool,
    pub archived: bool,
    pub spam: bool,
    pub deleted: bool,
}

impl SiteRecord {
    pub fn is_visible(&self) -> bool {
        self.public && !self.archived && !self.spam && !self.deleted
    }

    /// Absolute URL for a sitemap document served by this site.
    pub fn document_url(&self, document: &str) -> String {
        let path = if self.path.ends_with('/') {
            self.path.clone()
        } else {
            format!("{}/", self.path)
        };
        format!("http://{}{}{}", self.domain, path, document)
    }
}

/// Site-wide facts the sitemap needs from the platform configuration.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub base_url: String,
    pub name: String,
    pub language: String,
    pub timezone: Tz,
    pub public: bool,
}

impl SiteProfile {
    pub fn new(
        base_url: &str,
        name: impl Into<String>,
        language: impl Into<String>,
        timezone: Tz,
        public: bool,
    ) -> Result<Self, DomainError> {
        ensure_absolute_http(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            name: name.into(),
            language: language.into(),
            timezone,
            public,
        })
    }

    /// Site root with a trailing slash, used as the recency root entry.
    pub fn home_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    pub fn document_url(&self, document: &str) -> String {
        format!("{}/{}", self.base_url, document)
    }

    pub fn sitemap_url(&self) -> String {
        self.document_url("sitemap.xml")
    }

    pub fn sitemap_index_url(&self) -> String {
        self.document_url("sitemapindex.xml")
    }

    /// Request path under which the site's documents are served: empty for a
    /// site at the host root, otherwise `/segment...` without a trailing slash.
    pub fn base_path(&self) -> String {
        Url::parse(&self.base_url)
            .map(|url| url.path().trim_end_matches('/').to_string())
            .unwrap_or_default()
    }

    /// Request path of a document published by this site.
    pub fn document_path(&self, document: &str) -> String {
        format!("{}/{}", self.base_path(), document)
    }
}

fn ensure_absolute_http(candidate: &str) -> Result<(), DomainError> {
    let parsed = Url::parse(candidate)
        .map_err(|err| DomainError::validation(format!("`{candidate}` is not a URL: {err}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        _ => Err(DomainError::validation(format!(
            "`{candidate}` must be an absolute http(s) URL"
        ))),
    }
}
