use std::time::Duration;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use redis_transport::codec::FixedClock;
use redis_transport::store::MemoryStore;
use redis_transport::Document;
use redis_transport::Record;
use redis_transport::StoreTransport;
use redis_transport::TransportConfig;
use redis_transport::Updates;
use serde_json::Value;

pub const DB: i64 = 2;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_650_000_000 + secs, 0).unwrap()
}

pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn transport(store: &MemoryStore) -> StoreTransport {
    transport_with(store, TransportConfig::default())
}

pub fn transport_with(
    store: &MemoryStore,
    config: TransportConfig,
) -> StoreTransport {
    StoreTransport::builder(config)
        .connector(store.clone())
        .build()
        .unwrap()
}

pub fn frozen_transport(
    store: &MemoryStore,
    secs: i64,
) -> StoreTransport {
    StoreTransport::builder(TransportConfig::default())
        .connector(store.clone())
        .clock(FixedClock(at(secs)))
        .build()
        .unwrap()
}

pub fn stored(
    store: &MemoryStore,
    key: &str,
) -> Option<Value> {
    store
        .raw(DB, key)
        .map(|bytes| serde_json::from_slice(&bytes).unwrap())
}

pub async fn next_notice(
    updates: &mut Updates,
    ms: u64,
) -> Option<Record> {
    tokio::time::timeout(Duration::from_millis(ms), updates.recv())
        .await
        .ok()
        .flatten()
}
