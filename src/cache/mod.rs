//! Sitemap response cache.
//!
//! Rendered sitemap documents are kept in an in-process LRU keyed by
//! variant, namespaced by the site's sitemap URL. Any content mutation clears
//! the whole namespace: page membership shifts whenever a modification time
//! changes, so per-key invalidation is not safe.
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 256
//! ```

mod config;
mod keys;
mod lock;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use keys::{SitemapKey, namespace_for};
pub use store::{CachedDocument, SitemapCache};
pub use trigger::{CacheTrigger, ContentClock, ContentEvent};
