//! IMF-fixdate handling for `Last-Modified` / `If-Modified-Since`.

use time::{
    OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::BorrowedFormatItem,
    macros::format_description,
};

const IMF_FIXDATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Format an instant as an HTTP date. Sub-second precision is dropped.
pub fn format_http_date(time: OffsetDateTime) -> Option<String> {
    time.to_offset(UtcOffset::UTC).format(IMF_FIXDATE).ok()
}

/// Parse an HTTP date header value. Only the IMF-fixdate form is accepted.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value.trim(), IMF_FIXDATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}
