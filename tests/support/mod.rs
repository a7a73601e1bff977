#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use http_body_util::BodyExt;
use quick_xml::{Reader, events::Event};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use sitemapper::{
    application::sitemap::{SitemapOptions, SitemapService},
    cache::{CacheConfig, CacheTrigger, SitemapCache, namespace_for},
    domain::{
        entities::{ContentItem, ItemImage, SiteProfile},
        types::ContentKind,
    },
    infra::{
        http::{AdminState, HttpState, SitemapLink, build_admin_router, build_router},
        memory::InMemoryStore,
    },
    presentation::views::sitemap_link,
};

pub const SITE_URL: &str = "https://blog.example.com";
pub const ROBOTS_BASE: &str = "User-agent: *\nDisallow: /admin/\n";

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<SitemapCache>,
    pub public: Router,
    pub admin: Router,
}

impl Harness {
    pub fn new(store: InMemoryStore) -> Self {
        Self::with_visibility(store, true)
    }

    pub fn with_visibility(store: InMemoryStore, public: bool) -> Self {
        Self::for_site(store, SITE_URL, public)
    }

    pub fn for_site(store: InMemoryStore, site_url: &str, public: bool) -> Self {
        let store = Arc::new(store);
        let site = SiteProfile::new(site_url, "Example Blog", "en", chrono_tz::UTC, public)
            .expect("site profile");
        let cache = Arc::new(SitemapCache::new(
            namespace_for(&site.sitemap_url()),
            &CacheConfig::default(),
        ));
        let head_link = SitemapLink {
            tag: sitemap_link(&site.sitemap_url()).expect("sitemap link"),
            admin_prefix: "/admin".to_string(),
        };
        let service = SitemapService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            site,
            SitemapOptions::default(),
            Some(cache.clone()),
        );

        let trigger = CacheTrigger::new(Some(cache.clone()), service.clock());
        let public = build_router(HttpState {
            sitemap: Arc::new(service),
            robots_base: Arc::from(ROBOTS_BASE),
            head_link,
        });
        let admin = build_admin_router(AdminState {
            trigger,
            store: store.clone(),
        });

        Self {
            store,
            cache,
            public,
            admin,
        }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        send(&self.public, Request::get(uri).body(Body::empty()).expect("request")).await
    }

    pub async fn get_with(&self, uri: &str, header: (&str, &str)) -> Response<Body> {
        let request = Request::get(uri)
            .header(header.0, header.1)
            .body(Body::empty())
            .expect("request");
        send(&self.public, request).await
    }

    pub async fn hook(&self, payload: &str) -> Response<Body> {
        let request = Request::post("/_hooks/content")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request");
        send(&self.admin, request).await
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("infallible router")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn days_ago(days: i64) -> OffsetDateTime {
    OffsetDateTime::now_utc() - Duration::days(days)
}

pub fn item(n: u128, modified: OffsetDateTime) -> ContentItem {
    ContentItem {
        id: Uuid::from_u128(n),
        kind: ContentKind::Post,
        permalink: format!("{SITE_URL}/posts/{n}/"),
        title: format!("Post {n}"),
        published_at: modified,
        modified_at: modified,
        image: None,
    }
}

pub fn with_image(mut item: ContentItem, title: &str, caption: &str) -> ContentItem {
    item.image = Some(ItemImage {
        url: format!("{SITE_URL}/media/{}.jpg", item.id.as_u128()),
        title: title.to_string(),
        caption: caption.to_string(),
    });
    item
}

/// Text content of every element named `name`, entities decoded.
pub fn element_texts(xml: &str, name: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut texts = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event().expect("well-formed xml") {
            Event::Start(e) if e.name().as_ref() == name.as_bytes() => {
                current = Some(String::new());
            }
            Event::Text(e) => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&reader.decoder().decode(&e).expect("utf-8 text"));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(text) = current.as_mut() {
                    let entity = reader.decoder().decode(&e).expect("utf-8 entity");
                    text.push_str(match entity.as_ref() {
                        "lt" => "<",
                        "gt" => ">",
                        "amp" => "&",
                        "apos" => "'",
                        "quot" => "\"",
                        other => panic!("unexpected entity {other}"),
                    });
                }
            }
            Event::End(e) if e.name().as_ref() == name.as_bytes() => {
                if let Some(text) = current.take() {
                    texts.push(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    texts
}

/// Number of elements named `name`, empty ones included.
pub fn element_count(xml: &str, name: &str) -> usize {
    let mut reader = Reader::from_str(xml);
    let mut count = 0;
    loop {
        match reader.read_event().expect("well-formed xml") {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == name.as_bytes() => {
                count += 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    count
}
