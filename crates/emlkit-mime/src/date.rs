//! Best-effort parsing of `Date` header values.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Layouts with an explicit numeric offset, tried after RFC 2822 and RFC 3339.
const ZONED_LAYOUTS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%a, %d %b %y %H:%M:%S %z",
    "%a %b %d %H:%M:%S %Y %z",
    "%Y-%m-%d %H:%M:%S %z",
];

/// Layouts without a zone; interpreted as UTC.
const NAIVE_LAYOUTS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%a %b %d %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parses a date header value.
///
/// Never fails: a value matching none of the known layouts yields the Unix
/// epoch.
#[must_use]
pub fn parse_date(raw: &str) -> DateTime<Utc> {
    try_parse_date(raw).unwrap_or_else(|| {
        if !raw.trim().is_empty() {
            tracing::debug!(raw, "unrecognized date layout");
        }
        DateTime::UNIX_EPOCH
    })
}

fn try_parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = strip_comment(raw);
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    let normalized = normalize_zone(cleaned);
    for layout in ZONED_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, layout) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let without_zone = strip_zone_name(cleaned);
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(without_zone, layout).ok())
        .map(|naive| naive.and_utc())
}

/// Drops a trailing comment such as `(UTC)` or `(Pacific Standard Time)`.
fn strip_comment(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.find('(') {
        Some(idx) => trimmed[..idx].trim_end(),
        None => trimmed,
    }
}

/// Replaces a trailing zone abbreviation with its numeric offset.
fn normalize_zone(value: &str) -> String {
    let Some((head, zone)) = value.rsplit_once(' ') else {
        return value.to_string();
    };
    let offset = match zone.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => "+0000",
        "EST" => "-0500",
        "EDT" => "-0400",
        "CST" => "-0600",
        "CDT" => "-0500",
        "MST" => "-0700",
        "MDT" => "-0600",
        "PST" => "-0800",
        "PDT" => "-0700",
        "CET" => "+0100",
        "CEST" => "+0200",
        _ => return value.to_string(),
    };
    format!("{head} {offset}")
}

/// Drops a trailing alphabetic zone name that no layout understands.
fn strip_zone_name(value: &str) -> &str {
    match value.rsplit_once(' ') {
        Some((head, zone)) if zone.chars().all(|c| c.is_ascii_alphabetic()) && zone.len() <= 5 => {
            head
        }
        _ => value,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            parse_date("Mon, 2 Jan 2006 15:04:05 -0700"),
            utc(2006, 1, 2, 22, 4, 5)
        );
    }

    #[test]
    fn test_trailing_comment() {
        assert_eq!(
            parse_date("Tue, 10 Oct 2023 08:00:00 +0000 (UTC)"),
            utc(2023, 10, 10, 8, 0, 0)
        );
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(parse_date("2006-01-02T15:04:05Z"), utc(2006, 1, 2, 15, 4, 5));
    }

    #[test]
    fn test_named_zone() {
        assert_eq!(
            parse_date("Mon, 02 Jan 2006 15:04:05 GMT"),
            utc(2006, 1, 2, 15, 4, 5)
        );
    }

    #[test]
    fn test_naive_layout() {
        assert_eq!(parse_date("2006-01-02 15:04:05"), utc(2006, 1, 2, 15, 4, 5));
    }

    #[test]
    fn test_garbage_is_epoch() {
        assert_eq!(parse_date("not a date"), DateTime::UNIX_EPOCH);
        assert_eq!(parse_date(""), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_normalize_zone() {
        assert_eq!(normalize_zone("1 Jan 2020 10:00:00 PST"), "1 Jan 2020 10:00:00 -0800");
        assert_eq!(normalize_zone("1 Jan 2020 10:00:00 +0100"), "1 Jan 2020 10:00:00 +0100");
    }
}
