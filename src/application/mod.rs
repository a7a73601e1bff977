//! Application layer: sitemap routing, pagination, rendering and repository seams.

pub mod document;
pub mod error;
pub mod pagination;
pub mod repos;
pub mod routing;
pub mod sitemap;
