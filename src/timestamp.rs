//! Server timestamp parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Format the API uses for `created_at` and `updated_at`.
pub const SERVER_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S %z";

/// Parses a server timestamp, accepting RFC 3339 as a fallback.
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, SERVER_TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Missing, non-string or malformed values become `None`.
pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::parse;

    #[test]
    fn parses_server_format_with_offset() {
        let parsed = parse("2009/11/22 23:46:58 +0100").expect("server format");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2009, 11, 22, 22, 46, 58).unwrap());
    }

    #[test]
    fn parses_rfc3339() {
        let parsed = parse("2011-02-03T04:05:06Z").expect("rfc3339");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2011, 2, 3, 4, 5, 6).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse("yesterday"), None);
    }
}
