//! Clock and formatting helpers shared by the pipelines.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

/// Current wall-clock time in the local offset (UTC if the offset cannot be
/// determined), truncated to whole seconds.
pub fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.replace_nanosecond(0).unwrap_or(now)
}

pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

/// `DD-MM-YYYY`
pub fn log_date(at: OffsetDateTime) -> String {
    at.format(format_description!("[day]-[month]-[year]")).unwrap_or_default()
}

/// `HH:MM:SS`
pub fn log_time(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second]")).unwrap_or_default()
}
