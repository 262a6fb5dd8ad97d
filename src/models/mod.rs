pub mod file;
pub mod share;
pub mod user;

pub use file::*;
pub use share::*;
pub use user::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp for storage. Fixed precision keeps stored values
/// comparable as plain strings.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
