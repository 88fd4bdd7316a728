mod analysis;
mod document;
mod prompt;

pub use analysis::*;
pub use document::*;
pub use prompt::*;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

pub(crate) fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_default()
}
