//! Rendering of stored UTC instants in the site's configured timezone.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let seconds = utc.unix_timestamp();
    let nanos: u32 = utc.nanosecond();
    let datetime_utc = DateTime::<Utc>::from_timestamp(seconds, nanos)
        .or_else(|| DateTime::<Utc>::from_timestamp(seconds, 0))
        .unwrap_or_default();
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

/// W3C datetime (`2024-05-01T09:30:00+02:00`), the format sitemap `lastmod` expects.
pub fn w3c_datetime(time: OffsetDateTime, tz: Tz) -> String {
    localized_datetime(time, tz)
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string()
}

/// RFC 2822 timestamp used for the `generated` document attribute.
pub fn rfc2822_datetime(time: OffsetDateTime, tz: Tz) -> String {
    localized_datetime(time, tz).to_rfc2822()
}
