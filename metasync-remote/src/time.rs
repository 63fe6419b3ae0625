//! Remote timestamp parsing.
//!
//! The platform emits `2024-01-31T17:02:11.000+0000`, which is not RFC 3339
//! (no colon in the offset). Both forms are accepted; values are always
//! serialized back as RFC 3339 UTC.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn parse_remote_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::<FixedOffset>::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_remote_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

/// `Option<DateTime<Utc>>` variant; empty strings and nulls become `None`.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_remote_timestamp(s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_platform_and_rfc3339_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 31, 17, 2, 11).unwrap();
        assert_eq!(parse_remote_timestamp("2024-01-31T17:02:11.000+0000"), Some(expected));
        assert_eq!(parse_remote_timestamp("2024-01-31T17:02:11Z"), Some(expected));
        assert_eq!(parse_remote_timestamp("2024-01-31T18:02:11.000+01:00"), Some(expected));
        assert_eq!(parse_remote_timestamp("yesterday"), None);
    }
}
