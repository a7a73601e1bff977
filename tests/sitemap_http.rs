//! End-to-end tests for the public sitemap surface and the admin hook.

mod support;

use axum::{
    body::Body,
    http::{
        Request, Response, StatusCode,
        header::{AsHeaderName, CACHE_CONTROL, CONTENT_TYPE, LAST_MODIFIED},
    },
};
use sitemapper::infra::memory::InMemoryStore;
use time::{Duration, macros::datetime};
use uuid::Uuid;

use support::{
    Harness, ROBOTS_BASE, SITE_URL, body_text, days_ago, element_count, element_texts, item,
    with_image,
};

fn header(response: &Response<Body>, name: impl AsHeaderName) -> &str {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

#[tokio::test]
async fn index_lists_root_and_three_pages_for_250_items() {
    let base = datetime!(2024-02-01 00:00 UTC);
    let harness = Harness::new(InMemoryStore::with_items(
        (1..=250u128).map(|n| item(n, base + Duration::minutes(n as i64))),
    ));

    let response = harness.get("/sitemapindex.xml").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_TYPE), "application/xml; charset=utf-8");
    assert_eq!(
        header(&response, CACHE_CONTROL),
        "public, max-age=0, must-revalidate"
    );
    assert_eq!(header(&response, LAST_MODIFIED), "Thu, 01 Feb 2024 04:10:00 GMT");
    assert!(response.headers().contains_key("x-request-id"));

    let xml = body_text(response).await;
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert_eq!(element_count(&xml, "sitemap"), 4);
    assert_eq!(
        element_texts(&xml, "loc"),
        vec![
            format!("{SITE_URL}/sitemap.xml"),
            format!("{SITE_URL}/sitemap.xml?page=1"),
            format!("{SITE_URL}/sitemap.xml?page=2"),
            format!("{SITE_URL}/sitemap.xml?page=3"),
        ]
    );
}

#[tokio::test]
async fn page_past_the_end_is_not_found_without_xml() {
    let base = datetime!(2024-02-01 00:00 UTC);
    let harness = Harness::new(InMemoryStore::with_items(
        (1..=250u128).map(|n| item(n, base + Duration::minutes(n as i64))),
    ));

    let response = harness.get("/sitemap.xml?page=4").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(header(&response, CONTENT_TYPE).starts_with("text/html"));
    let body = body_text(response).await;
    assert!(!body.contains("<?xml"));
    assert!(harness.cache.is_empty());

    let response = harness.get("/sitemap.xml?page=3").await;
    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_text(response).await;
    assert_eq!(element_count(&xml, "url"), 50);
}

#[tokio::test]
async fn plain_sitemap_only_lists_the_last_week() {
    let harness = Harness::new(InMemoryStore::with_items([
        item(1, days_ago(10)),
        item(2, days_ago(1)),
    ]));

    let response = harness.get("/sitemap.xml").await;
    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_text(response).await;
    assert_eq!(
        element_texts(&xml, "loc"),
        vec![format!("{SITE_URL}/"), format!("{SITE_URL}/posts/2/")]
    );
    assert_eq!(element_texts(&xml, "changefreq"), vec!["always"]);
    assert_eq!(element_texts(&xml, "priority"), vec!["1.0"]);
}

#[tokio::test]
async fn zero_page_is_treated_as_plain_sitemap() {
    let harness = Harness::new(InMemoryStore::with_items([item(1, days_ago(1))]));

    let response = harness.get("/sitemap.xml?page=0").await;
    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_text(response).await;
    assert_eq!(element_texts(&xml, "changefreq"), vec!["always"]);
}

#[tokio::test]
async fn image_block_only_for_items_with_images() {
    let title = "Fish & Chips <b>tonight</b>";
    let caption = "Ünïcødé caption & more";
    let harness = Harness::new(InMemoryStore::with_items([
        with_image(item(1, days_ago(3)), title, caption),
        item(2, days_ago(2)),
    ]));

    let response = harness.get("/sitemap-all.xml").await;
    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_text(response).await;

    assert_eq!(element_count(&xml, "url"), 2);
    assert_eq!(element_count(&xml, "image:image"), 1);
    assert_eq!(element_count(&xml, "news:news"), 2);
    assert_eq!(
        element_texts(&xml, "image:loc"),
        vec![format!("{SITE_URL}/media/1.jpg")]
    );
    assert_eq!(element_texts(&xml, "image:title"), vec![title]);
    assert_eq!(element_texts(&xml, "image:caption"), vec![caption]);
    assert_eq!(element_texts(&xml, "news:name"), vec!["Example Blog"; 2]);
    assert_eq!(element_texts(&xml, "news:language"), vec!["en"; 2]);
}

#[tokio::test]
async fn robots_advertises_both_sitemaps() {
    let harness = Harness::new(InMemoryStore::new());

    let response = harness.get("/robots.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_TYPE), "text/plain; charset=utf-8");
    let body = body_text(response).await;
    assert_eq!(
        body,
        format!(
            "{ROBOTS_BASE}Sitemap: {SITE_URL}/sitemapindex.xml\nSitemap: {SITE_URL}/sitemap.xml\n"
        )
    );
    assert_eq!(body.matches("Sitemap: ").count(), 2);
}

#[tokio::test]
async fn if_modified_since_yields_not_modified() {
    let harness = Harness::new(InMemoryStore::with_items([item(1, days_ago(2))]));

    let first = harness.get("/sitemap-all.xml").await;
    let last_modified = header(&first, LAST_MODIFIED).to_string();
    assert!(!last_modified.is_empty());

    let response = harness
        .get_with("/sitemap-all.xml", ("if-modified-since", last_modified.as_str()))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header(&response, LAST_MODIFIED), last_modified);
    assert!(body_text(response).await.is_empty());

    let stale = harness
        .get_with(
            "/sitemap-all.xml",
            ("if-modified-since", "Mon, 01 Jan 2001 00:00:00 GMT"),
        )
        .await;
    assert_eq!(stale.status(), StatusCode::OK);
}

#[tokio::test]
async fn deleting_content_revalidates_conditional_requests() {
    let base = datetime!(2024-02-01 00:00 UTC);
    let harness = Harness::new(InMemoryStore::with_items(
        (1..=250u128).map(|n| item(n, base + Duration::minutes(n as i64))),
    ));

    let first = harness.get("/sitemap.xml?page=2").await;
    let last_modified = header(&first, LAST_MODIFIED).to_string();
    assert_eq!(last_modified, "Thu, 01 Feb 2024 04:10:00 GMT");
    let before = body_text(first).await;

    let conditional = ("if-modified-since", last_modified.as_str());
    let unchanged = harness.get_with("/sitemap.xml?page=2", conditional).await;
    assert_eq!(unchanged.status(), StatusCode::NOT_MODIFIED);

    harness.store.remove_item(Uuid::from_u128(250));
    let deleted = harness
        .hook(r#"{"event":"deleted","id":"00000000-0000-0000-0000-0000000000fa"}"#)
        .await;
    assert_eq!(deleted.status(), StatusCode::OK);

    let response = harness.get_with("/sitemap.xml?page=2", conditional).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(header(&response, LAST_MODIFIED), last_modified);
    let after = body_text(response).await;
    assert_ne!(after, before);
    assert!(!before.contains("/posts/50/"));
    assert!(after.contains("/posts/50/"));
}

#[tokio::test]
async fn control_characters_never_reach_the_document() {
    let mut entry = item(1, days_ago(1));
    entry.title = "Breaking\u{0B}news\u{1} today".to_string();
    let harness = Harness::new(InMemoryStore::with_items([entry]));

    let response = harness.get("/sitemap.xml").await;
    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_text(response).await;
    assert!(!xml.contains(['\u{0B}', '\u{1}']));
    assert_eq!(element_texts(&xml, "news:title"), vec!["Breakingnews today"]);
}

#[tokio::test]
async fn site_under_a_path_serves_sitemaps_beneath_it() {
    let harness = Harness::for_site(
        InMemoryStore::with_items([item(1, days_ago(1))]),
        "https://example.com/news",
        true,
    );

    let robots = body_text(harness.get("/robots.txt").await).await;
    assert!(robots.contains("Sitemap: https://example.com/news/sitemapindex.xml\n"));
    assert!(robots.contains("Sitemap: https://example.com/news/sitemap.xml\n"));

    for uri in [
        "/news/sitemap.xml",
        "/news/sitemap.xml?page=1",
        "/news/sitemap-all.xml",
        "/news/sitemapindex.xml",
    ] {
        assert_eq!(harness.get(uri).await.status(), StatusCode::OK, "{uri}");
    }

    let index = body_text(harness.get("/news/sitemapindex.xml").await).await;
    assert_eq!(
        element_texts(&index, "loc"),
        vec![
            "https://example.com/news/sitemap.xml".to_string(),
            "https://example.com/news/sitemap.xml?page=1".to_string(),
        ]
    );

    assert_eq!(harness.get("/sitemap.xml").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repeated_requests_are_served_from_cache() {
    let harness = Harness::new(InMemoryStore::with_items([item(1, days_ago(1))]));

    let first = body_text(harness.get("/sitemap.xml").await).await;
    let queries = harness.store.query_count();
    let second = body_text(harness.get("/sitemap.xml").await).await;

    assert_eq!(first, second);
    assert_eq!(harness.store.query_count(), queries);
    assert_eq!(harness.cache.len(), 1);
}

#[tokio::test]
async fn distinct_variants_get_distinct_entries() {
    let harness = Harness::new(InMemoryStore::with_items([item(1, days_ago(1))]));

    for uri in [
        "/sitemap.xml",
        "/sitemap.xml?page=1",
        "/sitemap-all.xml",
        "/sitemapindex.xml",
    ] {
        assert_eq!(harness.get(uri).await.status(), StatusCode::OK, "{uri}");
    }
    assert_eq!(harness.cache.len(), 4);
}

#[tokio::test]
async fn save_hook_invalidates_every_variant() {
    let harness = Harness::new(InMemoryStore::with_items([item(1, days_ago(1))]));

    harness.get("/sitemap-all.xml").await;
    harness.get("/sitemapindex.xml").await;
    harness.store.upsert_item(item(2, days_ago(0)));

    let cached = body_text(harness.get("/sitemap-all.xml").await).await;
    assert!(!cached.contains("/posts/2/"));

    let revision = harness
        .hook(r#"{"event":"revision_saved","id":"00000000-0000-0000-0000-000000000002"}"#)
        .await;
    assert_eq!(revision.status(), StatusCode::OK);
    assert_eq!(body_text(revision).await, r#"{"invalidated":0}"#);
    assert_eq!(harness.cache.len(), 2);

    let saved = harness
        .hook(r#"{"event":"saved","id":"00000000-0000-0000-0000-000000000002"}"#)
        .await;
    assert_eq!(saved.status(), StatusCode::OK);
    assert_eq!(body_text(saved).await, r#"{"invalidated":2}"#);
    assert!(harness.cache.is_empty());

    let fresh = body_text(harness.get("/sitemap-all.xml").await).await;
    assert!(fresh.contains("/posts/2/"));
}

#[tokio::test]
async fn malformed_hook_payload_is_rejected() {
    let harness = Harness::new(InMemoryStore::new());
    let response = harness.hook(r#"{"event":"exploded"}"#).await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn store_outage_is_a_server_error_and_nothing_is_cached() {
    let harness = Harness::new(InMemoryStore::with_items([item(1, days_ago(1))]));
    harness.store.set_unavailable(true);

    let response = harness.get("/sitemapindex.xml").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body_text(response).await.contains("<?xml"));
    assert!(harness.cache.is_empty());

    let robots = harness.get("/robots.txt").await;
    assert_eq!(robots.status(), StatusCode::SERVICE_UNAVAILABLE);

    harness.store.set_unavailable(false);
    let response = harness.get("/sitemapindex.xml").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn private_site_serves_no_sitemaps() {
    let harness =
        Harness::with_visibility(InMemoryStore::with_items([item(1, days_ago(1))]), false);

    for uri in ["/sitemap.xml", "/sitemap-all.xml", "/sitemapindex.xml"] {
        let response = harness.get(uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert!(!body_text(response).await.contains("rel=\"sitemap\""));
    }

    let robots = body_text(harness.get("/robots.txt").await).await;
    assert_eq!(robots, ROBOTS_BASE);
    assert_eq!(harness.store.query_count(), 1);
}

#[tokio::test]
async fn head_link_is_added_outside_admin_pages() {
    let harness = Harness::new(InMemoryStore::new());

    let public = harness.get("/some/missing/page").await;
    assert_eq!(public.status(), StatusCode::NOT_FOUND);
    let html = body_text(public).await;
    let link = html.find("rel=\"sitemap\"").expect("sitemap link in head");
    assert!(link < html.find("</head>").expect("head"));
    assert_eq!(html.matches("rel=\"sitemap\"").count(), 1);

    let admin = body_text(harness.get("/admin/posts").await).await;
    assert!(admin.contains("</head>"));
    assert!(!admin.contains("rel=\"sitemap\""));
}

#[tokio::test]
async fn admin_health_reflects_store_state() {
    let harness = Harness::new(InMemoryStore::new());
    let request = || {
        Request::get("/_health/db")
            .body(Body::empty())
            .expect("request")
    };

    let healthy = support::send(&harness.admin, request()).await;
    assert_eq!(healthy.status(), StatusCode::NO_CONTENT);

    harness.store.set_unavailable(true);
    let unhealthy = support::send(&harness.admin, request()).await;
    assert_eq!(unhealthy.status(), StatusCode::SERVICE_UNAVAILABLE);
}
