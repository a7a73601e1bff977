use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        HeaderMap, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use time::OffsetDateTime;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        routing::RequestContext,
        sitemap::{SitemapError, SitemapService},
    },
    cache::CachedDocument,
    presentation::views::render_not_found_response,
    util::http_date::parse_http_date,
};

use super::middleware::{SitemapLink, log_responses, set_request_context, sitemap_link_layer};

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const SITEMAP_CACHE_CONTROL: &str = "public, max-age=0, must-revalidate";
const SITEMAP_DOCUMENTS: [&str; 3] = ["sitemap.xml", "sitemap-all.xml", "sitemapindex.xml"];

#[derive(Clone)]
pub struct HttpState {
    pub sitemap: Arc<SitemapService>,
    /// robots.txt body the platform serves before `Sitemap:` lines are appended.
    pub robots_base: Arc<str>,
    pub head_link: SitemapLink,
}

pub fn build_router(state: HttpState) -> Router {
    let site = state.sitemap.site();
    let public = site.public;
    let head_link = state.head_link.clone();

    let mut router = Router::new().route("/robots.txt", get(robots_txt));
    if public {
        for document in SITEMAP_DOCUMENTS {
            router = router.route(&site.document_path(document), get(sitemap_document));
        }
    }

    let mut router = router.fallback(not_found).with_state(state);
    if public {
        router = router.layer(middleware::from_fn_with_state(head_link, sitemap_link_layer));
    }
    router
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn sitemap_document(State(state): State<HttpState>, request: Request<Body>) -> Response {
    let ctx = RequestContext::new(
        request.uri().path(),
        request.uri().query(),
        OffsetDateTime::now_utc(),
    );

    match state.sitemap.serve(&ctx).await {
        Ok(Some(document)) => document_response(document, request.headers()),
        Ok(None) => render_not_found_response(state.sitemap.site()),
        Err(SitemapError::NoMatchingItems { page }) => {
            let mut response = render_not_found_response(state.sitemap.site());
            ErrorReport::from_message(
                "infra::http::public::sitemap_document",
                StatusCode::NOT_FOUND,
                format!("Sitemap page {page} is past the last page"),
            )
            .attach(&mut response);
            response
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn robots_txt(State(state): State<HttpState>) -> Response {
    match state.sitemap.robots_txt(&state.robots_base).await {
        Ok(body) => plain_response(body),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn not_found(State(state): State<HttpState>) -> Response {
    render_not_found_response(state.sitemap.site())
}

fn document_response(document: CachedDocument, request_headers: &HeaderMap) -> Response {
    let fresh = document
        .last_modified
        .as_deref()
        .is_some_and(|last_modified| not_modified_since(last_modified, request_headers));

    let mut builder = Response::builder().header(CACHE_CONTROL, SITEMAP_CACHE_CONTROL);
    if let Some(last_modified) = &document.last_modified {
        builder = builder.header(LAST_MODIFIED, last_modified.as_str());
    }

    let response = if fresh {
        builder.status(StatusCode::NOT_MODIFIED).body(Body::empty())
    } else {
        builder
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(Body::from(document.body))
    };
    response.unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn not_modified_since(last_modified: &str, headers: &HeaderMap) -> bool {
    let Some(last_modified) = parse_http_date(last_modified) else {
        return false;
    };
    headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
        .is_some_and(|since| since >= last_modified)
}

fn plain_response(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
