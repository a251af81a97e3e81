//! Tolerant timestamp handling for message payloads.
//!
//! The backend emits ISO-8601 strings, usually with an explicit offset
//! (`2024-05-01T10:00:00.123456+00:00`) but naive values have been observed
//! from older rows. Epoch milliseconds are accepted too.

use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Parse an ISO-8601 / RFC 3339 timestamp. Naive values are taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
        return Some(ts);
    }
    PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Render a timestamp as RFC 3339.
#[must_use]
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

fn from_epoch_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp_from_value<E: serde::de::Error>(value: &Value) -> Result<Option<OffsetDateTime>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(raw) => parse_timestamp(raw)
            .map(Some)
            .ok_or_else(|| E::custom(format!("invalid timestamp: {raw}"))),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
            .and_then(from_epoch_millis)
            .map(Some)
            .ok_or_else(|| E::custom(format!("invalid epoch timestamp: {n}"))),
        other => Err(E::custom(format!("expected timestamp, got {other}"))),
    }
}

/// `created_at`: a missing or null value means "now" (receive time).
pub(crate) fn deserialize_created_at<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(timestamp_from_value::<D::Error>(&value)?.unwrap_or_else(OffsetDateTime::now_utc))
}

pub(crate) fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    timestamp_from_value::<D::Error>(&value)
}

pub(crate) fn serialize<S>(ts: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let rendered = ts.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&rendered)
}

pub(crate) fn serialize_optional<S>(ts: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match ts {
        Some(ts) => serialize(ts, serializer),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[cfg(test)]
#[path = "timestamp_test.rs"]
mod tests;
