//! HTML fragments rendered around the sitemap surface.

pub mod views;
