//! IMF-fixdate formatting and parsing (RFC 9110 §5.6.7).

use std::time::SystemTime;

use chrono::{DateTime, Utc};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Formats a timestamp as `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(IMF_FIXDATE).to_string()
}

/// Formats a file-system timestamp, truncated to whole seconds.
pub fn http_date_from_system(at: SystemTime) -> String {
    http_date(DateTime::<Utc>::from(at))
}

/// Parses an HTTP date header value. Returns `None` for anything unparseable.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whole seconds since the Unix epoch, as HTTP dates carry no sub-second part.
pub fn unix_seconds(at: SystemTime) -> i64 {
    DateTime::<Utc>::from(at).timestamp()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn formats_imf_fixdate() {
        let at = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn parses_what_it_formats() {
        let at = Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 1).unwrap();
        assert_eq!(parse_http_date(&http_date(at)), Some(at));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_http_date("yesterday"), None);
    }
}
