//! Wire-format timestamp helpers.
//!
//! Every timestamp exchanged with the historical store (and echoed in
//! responses) uses the fixed civil-time format `YYYY-MM-DD HH:MM:SS` with no
//! zone suffix, interpreted in the deployment's configured timezone. Range
//! bounds sent to ClickHouse must reproduce this format exactly; any deviation
//! silently shifts query results.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a wire-format timestamp as local civil time in `tz`.
///
/// Ambiguous local times (DST fold) resolve to the earlier instant; local
/// times that do not exist (DST gap) return `None`.
pub fn parse_wire(s: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(s, WIRE_FORMAT).ok()?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earlier, _) => Some(earlier),
        LocalResult::None => None,
    }
}

/// Format an instant in the wire civil-time convention of `tz`.
pub fn format_wire(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format(WIRE_FORMAT).to_string()
}

/// Convert seconds-since-epoch (the live store's convention) to a wire string.
pub fn epoch_to_wire(secs: i64, tz: Tz) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| format_wire(dt, tz))
}

/// Wire string for `minutes` minutes before `now`.
pub fn wire_minutes_ago(now: DateTime<Utc>, minutes: i64, tz: Tz) -> String {
    format_wire(now - Duration::minutes(minutes), tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::Asia::Kolkata;

    #[test]
    fn parse_and_format_round_trip() {
        let dt = parse_wire("2026-08-28 14:30:05", Kolkata).unwrap();
        assert_eq!(dt.hour(), 14);
        assert_eq!(dt.minute(), 30);
        assert_eq!(format_wire(dt.with_timezone(&Utc), Kolkata), "2026-08-28 14:30:05");
    }

    #[test]
    fn parse_rejects_zone_suffix() {
        assert!(parse_wire("2026-08-28T14:30:05Z", Kolkata).is_none());
        assert!(parse_wire("2026-08-28 14:30", Kolkata).is_none());
    }

    #[test]
    fn format_converts_to_local_offset() {
        // 09:00 UTC is 14:30 IST (UTC+5:30)
        let dt = Utc.with_ymd_and_hms(2026, 8, 28, 9, 0, 0).unwrap();
        assert_eq!(format_wire(dt, Kolkata), "2026-08-28 14:30:00");
    }

    #[test]
    fn epoch_seconds_convert_to_wire() {
        // 2026-08-28 09:00:00 UTC
        let secs = Utc.with_ymd_and_hms(2026, 8, 28, 9, 0, 0).unwrap().timestamp();
        assert_eq!(epoch_to_wire(secs, Kolkata).unwrap(), "2026-08-28 14:30:00");
    }

    #[test]
    fn wire_strings_sort_chronologically() {
        // The fixed-width format makes lexicographic order match time order,
        // which trail sorting relies on.
        let a = "2026-08-28 09:59:59".to_string();
        let b = "2026-08-28 10:00:00".to_string();
        assert!(a < b);
    }
}
