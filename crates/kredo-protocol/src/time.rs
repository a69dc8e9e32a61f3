//! Timestamp handling for protocol documents.
//!
//! All protocol times are ISO-8601 UTC with second precision and a
//! trailing `Z`. Sub-second precision is truncated at the boundary so the
//! stored form, the signed form, and the wire form are identical.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time truncated to whole seconds.
#[must_use]
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

/// Truncate a timestamp to whole seconds.
#[must_use]
pub fn truncate(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

/// Format a timestamp in the protocol form (`2026-01-02T03:04:05Z`).
#[must_use]
pub fn format(t: DateTime<Utc>) -> String {
    truncate(t).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a protocol timestamp. Accepts any RFC 3339 offset and normalizes
/// to UTC.
///
/// # Errors
///
/// Returns the underlying chrono parse error on malformed input.
pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Serde adapter for required protocol timestamps.
pub mod serde_second {
    use super::{format, parse};
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize as `%Y-%m-%dT%H:%M:%SZ`.
    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&format(*t))
    }

    /// Deserialize from any RFC 3339 form.
    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(de)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional protocol timestamps.
pub mod serde_second_opt {
    use super::{format, parse};
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize as `%Y-%m-%dT%H:%M:%SZ`, or `null`.
    pub fn serialize<S: Serializer>(
        t: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => ser.serialize_str(&format(*t)),
            None => ser.serialize_none(),
        }
    }

    /// Deserialize from any RFC 3339 form, or `null`.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let s: Option<String> = Option::deserialize(de)?;
        match s {
            Some(s) => parse(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
