#![forbid(unsafe_code)]

//! `xsd:dateTime` handling for SAML instants.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format as millisecond UTC: `2006-07-17T22:26:40.000Z`.
pub fn format_instant(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse an `xsd:dateTime`. A value without a zone is taken as UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}

/// Re-format an instant as millisecond UTC; unparseable input is
/// returned unchanged.
pub fn normalize_instant(value: &str) -> String {
    parse_instant(value)
        .map(|t| format_instant(&t))
        .unwrap_or_else(|| value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_instant("2006-07-17T22:26:40Z"), "2006-07-17T22:26:40.000Z");
        assert_eq!(
            normalize_instant("2012-01-06T15:06:44.702-08:00"),
            "2012-01-06T23:06:44.702Z"
        );
        assert_eq!(normalize_instant("2008-05-27T08:19:29"), "2008-05-27T08:19:29.000Z");
        assert_eq!(normalize_instant("yesterday"), "yesterday");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_instant("").is_none());
        assert!(parse_instant("2006-13-40T00:00:00Z").is_none());
    }
}
