//! XML document construction for `<urlset>` and `<sitemapindex>` documents.
//!
//! All text nodes and attribute values pass through [`quick_xml::Writer`],
//! which escapes markup-significant characters, so author-supplied titles and
//! captions cannot break out of their elements. Characters XML 1.0 forbids
//! outright are dropped before writing.

use std::borrow::Cow;
use std::time::Duration;

use chrono_tz::Tz;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::pagination::{SitemapIndexEntry, SitemapIndexPlan};
use crate::domain::entities::{ContentItem, ItemImage, SiteProfile, TaxonomyTerm};
use crate::util::timezone::{rfc2822_datetime, w3c_datetime};

pub const NS_SITEMAP: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
pub const NS_IMAGE: &str = "http://www.google.com/schemas/sitemap-image/1.1";
pub const NS_NEWS: &str = "http://www.google.com/schemas/sitemap-news/0.9";
pub const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const SCHEMA_LOCATION: &str = "http://www.sitemaps.org/schemas/sitemap/0.9 \
http://www.sitemaps.org/schemas/sitemap/0.9/sitemap.xsd \
http://www.google.com/schemas/sitemap-news/0.9 \
http://www.google.com/schemas/sitemap-news/0.9/sitemap-news.xsd";

const ROOT_CHANGEFREQ: &str = "always";
const ROOT_PRIORITY: &str = "1.0";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to encode sitemap document: {0}")]
    Encoding(String),
}

/// Diagnostic counters attached to a document when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugInfo {
    pub queries: u32,
    pub elapsed: Duration,
}

impl DebugInfo {
    fn attribute_value(&self) -> String {
        format!(
            "queries={}; elapsed_ms={}",
            self.queries,
            self.elapsed.as_millis()
        )
    }
}

/// Per-render values that are not derived from content.
#[derive(Debug, Clone, Copy)]
pub struct RenderStamp {
    pub generated: OffsetDateTime,
    pub debug: Option<DebugInfo>,
}

impl RenderStamp {
    pub fn new(generated: OffsetDateTime) -> Self {
        Self {
            generated,
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: DebugInfo) -> Self {
        self.debug = Some(debug);
        self
    }
}

/// Renders sitemap documents for one site.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    home_url: String,
    publication_name: String,
    language: String,
    timezone: Tz,
}

impl DocumentBuilder {
    pub fn new(site: &SiteProfile) -> Self {
        Self {
            home_url: site.home_url(),
            publication_name: site.name.clone(),
            language: site.language.clone(),
            timezone: site.timezone,
        }
    }

    /// Builds a `<urlset>`. Items are written in the given order; `terms` are
    /// appended as location-only entries.
    pub fn build_urlset(
        &self,
        items: &[ContentItem],
        include_recency_root: bool,
        terms: &[TaxonomyTerm],
        stamp: &RenderStamp,
    ) -> Result<String, DocumentError> {
        let mut doc = XmlDoc::new();
        doc.declaration()?;

        let generated = rfc2822_datetime(stamp.generated, self.timezone);
        let debug = stamp.debug.map(|info| info.attribute_value());
        let mut root = BytesStart::new("urlset");
        root.push_attribute(("xmlns", NS_SITEMAP));
        root.push_attribute(("xmlns:image", NS_IMAGE));
        root.push_attribute(("xmlns:news", NS_NEWS));
        root.push_attribute(("xmlns:xsi", NS_XSI));
        root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
        root.push_attribute(("generated", generated.as_str()));
        if let Some(debug) = debug.as_deref() {
            root.push_attribute(("debug", debug));
        }
        doc.start(root)?;

        if include_recency_root {
            doc.open("url")?;
            doc.text_element("loc", &self.home_url)?;
            doc.text_element("changefreq", ROOT_CHANGEFREQ)?;
            doc.text_element("priority", ROOT_PRIORITY)?;
            doc.close("url")?;
        }

        for item in items {
            self.write_item(&mut doc, item)?;
        }

        for term in terms {
            doc.open("url")?;
            doc.text_element("loc", &term.link)?;
            doc.close("url")?;
        }

        doc.close("urlset")?;
        doc.finish()
    }

    /// Builds a `<sitemapindex>` with the root entry first, then one entry per page.
    pub fn build_sitemapindex(
        &self,
        plan: &SitemapIndexPlan,
        stamp: &RenderStamp,
    ) -> Result<String, DocumentError> {
        let mut doc = XmlDoc::new();
        doc.declaration()?;

        let generated = rfc2822_datetime(stamp.generated, self.timezone);
        let debug = stamp.debug.map(|info| info.attribute_value());
        let mut root = BytesStart::new("sitemapindex");
        root.push_attribute(("xmlns", NS_SITEMAP));
        root.push_attribute(("generated", generated.as_str()));
        if let Some(debug) = debug.as_deref() {
            root.push_attribute(("debug", debug));
        }
        doc.start(root)?;

        for entry in plan.entries() {
            self.write_index_entry(&mut doc, entry)?;
        }

        doc.close("sitemapindex")?;
        doc.finish()
    }

    fn write_item(&self, doc: &mut XmlDoc, item: &ContentItem) -> Result<(), DocumentError> {
        doc.open("url")?;
        doc.text_element("loc", &item.permalink)?;
        doc.text_element("lastmod", &w3c_datetime(item.modified_at, self.timezone))?;

        if let Some(image) = &item.image {
            write_image(doc, image)?;
        }

        // news:publication must precede publication_date and title.
        doc.open("news:news")?;
        doc.open("news:publication")?;
        doc.text_element("news:name", &self.publication_name)?;
        doc.text_element("news:language", &self.language)?;
        doc.close("news:publication")?;
        doc.text_element(
            "news:publication_date",
            &w3c_datetime(item.published_at, self.timezone),
        )?;
        doc.text_element("news:title", &item.title)?;
        doc.close("news:news")?;

        doc.close("url")
    }

    fn write_index_entry(
        &self,
        doc: &mut XmlDoc,
        entry: &SitemapIndexEntry,
    ) -> Result<(), DocumentError> {
        doc.open("sitemap")?;
        doc.text_element("loc", &entry.loc)?;
        if let Some(lastmod) = entry.lastmod {
            doc.text_element("lastmod", &w3c_datetime(lastmod, self.timezone))?;
        }
        doc.close("sitemap")
    }
}

fn write_image(doc: &mut XmlDoc, image: &ItemImage) -> Result<(), DocumentError> {
    doc.open("image:image")?;
    doc.text_element("image:loc", &image.url)?;
    doc.text_element("image:caption", &image.caption)?;
    doc.text_element("image:title", &image.title)?;
    doc.close("image:image")
}

struct XmlDoc {
    writer: Writer<Vec<u8>>,
}

impl XmlDoc {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), DocumentError> {
        self.writer
            .write_event(event)
            .map_err(|err| DocumentError::Encoding(err.to_string()))
    }

    fn declaration(&mut self) -> Result<(), DocumentError> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    fn start(&mut self, element: BytesStart<'_>) -> Result<(), DocumentError> {
        self.write(Event::Start(element))
    }

    fn open(&mut self, name: &str) -> Result<(), DocumentError> {
        self.start(BytesStart::new(name))
    }

    fn close(&mut self, name: &str) -> Result<(), DocumentError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, value: &str) -> Result<(), DocumentError> {
        self.open(name)?;
        self.write(Event::Text(BytesText::new(&xml_safe(value))))?;
        self.close(name)
    }

    fn finish(self) -> Result<String, DocumentError> {
        let mut bytes = self.writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|err| DocumentError::Encoding(err.to_string()))
    }
}

/// Removes characters outside the XML 1.0 `Char` production.
fn xml_safe(value: &str) -> Cow<'_, str> {
    fn allowed(ch: char) -> bool {
        matches!(ch, '\t' | '\n' | '\r') || (ch >= ' ' && ch != '\u{FFFE}' && ch != '\u{FFFF}')
    }

    if value.chars().all(allowed) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(value.chars().filter(|&ch| allowed(ch)).collect())
    }
}
