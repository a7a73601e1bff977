//! Content mutation notifications that drive cache invalidation.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::store::SitemapCache;

/// Mutation reported by the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContentEvent {
    /// An item was created or updated.
    Saved { id: Uuid },
    /// An item was removed or unpublished.
    Deleted { id: Uuid },
    /// A revision snapshot was stored; the live item is unchanged.
    RevisionSaved { id: Uuid },
}

impl ContentEvent {
    pub fn id(&self) -> Uuid {
        match *self {
            ContentEvent::Saved { id }
            | ContentEvent::Deleted { id }
            | ContentEvent::RevisionSaved { id } => id,
        }
    }

    pub fn invalidates(&self) -> bool {
        !matches!(self, ContentEvent::RevisionSaved { .. })
    }
}

/// Wall-clock second of the last content mutation, in unix seconds.
///
/// Every mark lands strictly after the previous one and after the current
/// second, so a client holding an older `Last-Modified` value always sees a
/// newer one once content changes, even when the change removed the newest
/// item.
#[derive(Debug, Default)]
pub struct ContentClock {
    changed_at: AtomicI64,
}

impl ContentClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) -> OffsetDateTime {
        self.mark_at(OffsetDateTime::now_utc())
    }

    pub fn mark_at(&self, now: OffsetDateTime) -> OffsetDateTime {
        let floor = now.unix_timestamp() + 1;
        let previous = self
            .changed_at
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(floor.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        let marked = floor.max(previous + 1);
        OffsetDateTime::from_unix_timestamp(marked).unwrap_or(now)
    }

    /// `None` until the first mutation is seen.
    pub fn last_change(&self) -> Option<OffsetDateTime> {
        match self.changed_at.load(Ordering::Acquire) {
            0 => None,
            seconds => OffsetDateTime::from_unix_timestamp(seconds).ok(),
        }
    }
}

/// Applies content events to the sitemap cache and the content clock.
#[derive(Clone)]
pub struct CacheTrigger {
    cache: Option<Arc<SitemapCache>>,
    clock: Arc<ContentClock>,
}

impl CacheTrigger {
    pub fn new(cache: Option<Arc<SitemapCache>>, clock: Arc<ContentClock>) -> Self {
        Self { cache, clock }
    }

    /// Returns the number of documents dropped.
    pub fn content_changed(&self, event: ContentEvent) -> usize {
        if !event.invalidates() {
            debug!(content_id = %event.id(), "Ignoring revision snapshot");
            return 0;
        }

        let changed_at = self.clock.mark();
        debug!(content_id = %event.id(), %changed_at, "Content clock advanced");

        let Some(cache) = &self.cache else {
            debug!(?event, "Cache trigger skipped: cache disabled");
            return 0;
        };

        let cleared = cache.invalidate_all();
        info!(
            cache = "sitemap",
            namespace = cache.namespace(),
            content_id = %event.id(),
            cleared,
            "Sitemap cache invalidated"
        );
        cleared
    }
}
