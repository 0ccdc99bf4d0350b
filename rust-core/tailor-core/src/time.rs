//! # Time Handling
//!
//! Time zones and the text formats the database layer uses for temporal
//! values.
//!
//! A connection has one authoritative time zone. Every timestamp that is
//! sent to the database is first converted into that zone, and every naive
//! date-time read back is interpreted in it.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone as _};
use tracing::warn;

/// Time zone of a database connection, as a fixed offset from UTC
pub type TimeZone = FixedOffset;

/// Text format for timestamps (fraction printed only when non-zero)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Text format for dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Text format for times of day (fraction printed only when non-zero)
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// The offset of the system's local time zone right now
#[must_use]
pub fn system_time_zone() -> TimeZone {
    *Local::now().offset()
}

/// The UTC time zone
#[must_use]
pub fn utc() -> TimeZone {
    FixedOffset::east_opt(0).unwrap_or_else(system_time_zone)
}

/// Parse a time-zone description reported by a database server
///
/// Understands numeric offsets (`+05:30`, `-0800`), `SYSTEM`, and the
/// names `UTC`, `GMT` and `Z`. Any other name falls back to the system time
/// zone, since named zones cannot be expressed as a fixed offset.
#[must_use]
pub fn parse_time_zone(description: &str) -> TimeZone {
    let trimmed = description.trim();
    if let Some(offset) = parse_offset(trimmed) {
        return offset;
    }
    match trimmed.to_ascii_uppercase().as_str() {
        "SYSTEM" | "" => system_time_zone(),
        "UTC" | "GMT" | "Z" => utc(),
        _ => {
            warn!(time_zone = %trimmed, "Unsupported named time zone, using system offset");
            system_time_zone()
        }
    }
}

/// Parse `[+-]HH:MM` or `[+-]HHMM`
fn parse_offset(text: &str) -> Option<TimeZone> {
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Format a timestamp as database text in the given time zone
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<FixedOffset>, zone: TimeZone) -> String {
    timestamp
        .with_timezone(&zone)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Format a date as database text
#[must_use]
pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Format a time of day as database text
#[must_use]
pub fn format_time(time: &NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Attach a time zone to a naive date-time read from the database
///
/// Returns `None` for local times that do not exist in the zone.
#[must_use]
pub fn localize(naive: &NaiveDateTime, zone: TimeZone) -> Option<DateTime<FixedOffset>> {
    zone.from_local_datetime(naive).single()
}

/// Parse database timestamp text in the given time zone
///
/// Accepts the space separated form and the ISO `T` separated form.
#[must_use]
pub fn parse_timestamp(text: &str, zone: TimeZone) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .and_then(|naive| localize(&naive, zone))
}

/// Parse database date text
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Parse database time text
#[must_use]
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).ok()
}
