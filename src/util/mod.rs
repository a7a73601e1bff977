//! Small formatting helpers shared across layers.

pub mod http_date;
pub mod timezone;
