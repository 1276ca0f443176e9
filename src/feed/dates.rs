use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Naive formats tried after the self-describing RFC ones, in priority order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d %b %Y %H:%M:%S",
];

/// Try multiple date formats in priority order, returning the first success.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_rfc2822() {
        let dt = parse_date("Tue, 01 Jul 2025 09:30:00 +0000").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 7, 1));
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let dt = parse_date("2025-07-01T09:30:00+09:00").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (0, 30));
    }

    #[test]
    fn parses_naive_datetime() {
        assert!(parse_date("2025-07-01T09:30:00").is_some());
        assert!(parse_date("2025-07-01 09:30:00").is_some());
    }

    #[test]
    fn parses_bare_date_as_midnight() {
        let dt = parse_date("2025-07-01").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (0, 0));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
    }
}
