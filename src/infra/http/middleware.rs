use std::time::Instant;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{
        HeaderValue, Request,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware::Next,
    response::Response,
};
use lol_html::{
    RewriteStrSettings, element, errors::RewritingError, html_content::ContentType, rewrite_str,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

const MAX_HTML_BODY: usize = 4 * 1024 * 1024;

#[derive(Clone)]
pub struct RequestId(pub String);

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4().to_string());
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0) {
        response.headers_mut().insert("x-request-id", value);
    }
    response.extensions_mut().insert(id);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "sitemapper::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "sitemapper::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// State for [`sitemap_link_layer`]: the rendered tag and the path prefix it skips.
#[derive(Clone)]
pub struct SitemapLink {
    pub tag: String,
    pub admin_prefix: String,
}

/// Inserts the sitemap `<link>` at the end of the `<head>` of public HTML pages.
pub async fn sitemap_link_layer(
    State(link): State<SitemapLink>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let administrative = request.uri().path().starts_with(&link.admin_prefix);
    let response = next.run(request).await;
    if administrative || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_HTML_BODY).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                target = "sitemapper::http::head_link",
                error = %err,
                "failed to buffer html body; serving without sitemap link"
            );
            return Response::from_parts(parts, Body::empty());
        }
    };

    let Ok(html) = std::str::from_utf8(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    match insert_head_link(html, &link.tag) {
        Ok(rewritten) => {
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(rewritten))
        }
        Err(err) => {
            warn!(
                target = "sitemapper::http::head_link",
                error = %err,
                "failed to rewrite html; serving without sitemap link"
            );
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

/// Appends `tag` as the last child of the document's first `<head>`.
fn insert_head_link(html: &str, tag: &str) -> Result<String, RewritingError> {
    let mut inserted = false;
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("head", move |el| {
                if !inserted {
                    el.append(tag, ContentType::Html);
                    inserted = true;
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}
