use std::fmt::Debug;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde_json::Value;

use crate::constants::TIMESTAMP_FIELD;
use crate::Document;

/// Source of write timestamps.
pub trait Clock: Send + Sync + Debug + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant. Two writes stamped by it carry equal
/// timestamps, so the second one is stale.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Merges `now` into the document unless it already carries a parseable
/// timestamp.
///
/// Callers that supply a valid timestamp keep it, which is how a client
/// replays an older value or writes one produced elsewhere. A null or
/// unparseable field is overwritten.
pub fn stamp(
    value: &mut Document,
    now: DateTime<Utc>,
) {
    if timestamp_of(value).and_then(parse_timestamp).is_none() {
        value.insert(TIMESTAMP_FIELD.to_string(), Value::String(format_timestamp(now)));
    }
}

/// Raw timestamp string carried by a document, if any.
pub fn timestamp_of(value: &Document) -> Option<&str> {
    value.get(TIMESTAMP_FIELD).and_then(Value::as_str)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Optimistic concurrency rule.
///
/// A write is allowed when nothing comparable is stored (no value, or a value
/// without a parseable timestamp). Against a stamped value the new timestamp
/// must be present and strictly newer.
pub fn write_allowed(
    stored: Option<&Document>,
    attempted: &Document,
) -> bool {
    let Some(stored_at) = stored.and_then(timestamp_of).and_then(parse_timestamp) else {
        return true;
    };

    match timestamp_of(attempted).and_then(parse_timestamp) {
        Some(attempted_at) => attempted_at > stored_at,
        None => false,
    }
}
