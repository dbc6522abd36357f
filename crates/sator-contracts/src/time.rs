//! Timestamp parsing and the fixed wire format used for hashed records.
//!
//! Every instant that contributes to a hash is rendered as
//! `YYYY-MM-DDTHH:MM:SS.ffffffZ` (UTC, exactly six fractional digits), so a
//! record reloaded from storage canonicalizes to the same bytes it was
//! hashed from.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

use crate::error::{SatorError, SatorResult};

/// Current wall-clock time truncated to microsecond precision.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render `ts` in the fixed hashing format.
pub fn format_micros(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an ISO-8601 instant supplied by a caller.
///
/// Accepts RFC 3339 (`Z` or numeric offset), naive date-times which are
/// taken as UTC, and bare dates (midnight UTC). Anything else is an
/// `InvalidTimestamp` error.
pub fn parse_timestamp(input: &str) -> SatorResult<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SatorError::InvalidTimestamp {
            input: input.to_string(),
            reason: "empty timestamp".to_string(),
        });
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|e| {
        SatorError::InvalidTimestamp {
            input: input.to_string(),
            reason: e.to_string(),
        }
    })?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SatorError::InvalidTimestamp {
            input: input.to_string(),
            reason: "date has no midnight".to_string(),
        })
}

/// Serde adapter writing a `DateTime<Utc>` in the fixed hashing format.
pub mod micros {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_micros(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
