//! Shared helpers for unit tests.

use std::time::Duration;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use serde_json::Value;

use crate::codec::FixedClock;
use crate::store::MemoryStore;
use crate::Document;
use crate::Record;
use crate::StoreTransport;
use crate::TransportConfig;
use crate::Updates;

pub fn test_config() -> TransportConfig {
    TransportConfig::default()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn memory_transport(
    store: &MemoryStore,
    config: TransportConfig,
) -> StoreTransport {
    StoreTransport::builder(config)
        .connector(store.clone())
        .build()
        .unwrap()
}

pub fn fixed_clock_transport(
    store: &MemoryStore,
    config: TransportConfig,
    secs: i64,
) -> StoreTransport {
    StoreTransport::builder(config)
        .connector(store.clone())
        .clock(FixedClock(at(secs)))
        .build()
        .unwrap()
}

/// Next notice, or `None` if nothing arrives within `ms`.
pub async fn next_notice(
    updates: &mut Updates,
    ms: u64,
) -> Option<Record> {
    tokio::time::timeout(Duration::from_millis(ms), updates.recv())
        .await
        .ok()
        .flatten()
}
