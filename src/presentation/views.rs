use crate::application::error::{ErrorReport, HttpError};
use crate::application::sitemap::SitemapError;
use crate::domain::entities::SiteProfile;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

impl From<TemplateRenderError> for SitemapError {
    fn from(err: TemplateRenderError) -> Self {
        SitemapError::Template(format!("{}: {}", err.public_message, err.error))
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate<'a> {
    site_name: &'a str,
    language: &'a str,
    home_url: String,
}

/// Shared 404 page used by unmatched routes and sitemap pages past the end.
pub fn render_not_found_response(site: &SiteProfile) -> Response {
    let template = NotFoundTemplate {
        site_name: &site.name,
        language: &site.language,
        home_url: site.home_url(),
    };
    let mut response = render_template_response(template, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Template)]
#[template(path = "sitemap_link.html")]
struct SitemapLinkTemplate<'a> {
    href: &'a str,
}

/// The `<link rel="sitemap">` tag placed in the head of public pages.
pub fn sitemap_link(href: &str) -> Result<String, SitemapError> {
    SitemapLinkTemplate { href }.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::sitemap_link",
            "Sitemap link rendering failed",
            err,
        )
        .into()
    })
}
