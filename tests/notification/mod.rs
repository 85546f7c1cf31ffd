use redis_transport::store::MemoryStore;
use redis_transport::EntityRef;
use redis_transport::Payload;
use redis_transport::PutOptions;
use redis_transport::Transport;
use redis_transport::UpdateFilter;
use serde_json::json;

use crate::common::doc;
use crate::common::next_notice;
use crate::common::transport;

#[tokio::test]
async fn filtered_subscription_sees_only_its_entity() {
    let store = MemoryStore::new();
    let transport = transport(&store);
    let mut only_x = transport
        .updated(UpdateFilter::new(Some("X"), None))
        .await
        .unwrap();
    let mut all = transport.updated(UpdateFilter::all()).await.unwrap();

    for id in ["Y", "X", "Y"] {
        transport
            .put(&EntityRef::new(id, "meta"), doc(json!({})), PutOptions::unchecked())
            .await
            .unwrap();
    }

    let mut seen_by_all = Vec::new();
    while let Some(record) = next_notice(&mut all, 200).await {
        assert_eq!(record.value, Payload::Deferred);
        seen_by_all.push(record.id);
    }
    seen_by_all.sort();
    assert_eq!(seen_by_all, vec!["X", "Y", "Y"]);

    let mut seen_by_x = Vec::new();
    while let Some(record) = next_notice(&mut only_x, 50).await {
        seen_by_x.push(record.id);
    }
    assert_eq!(seen_by_x, vec!["X"]);
}

#[tokio::test]
async fn notice_followed_by_get_reads_new_value() {
    let store = MemoryStore::new();
    let transport = transport(&store);
    let mut updates = transport
        .updated(UpdateFilter::new(Some("lamp"), Some("state")))
        .await
        .unwrap();

    transport
        .put(
            &EntityRef::new("lamp", "state"),
            doc(json!({"on": true})),
            PutOptions::default(),
        )
        .await
        .unwrap();

    let notice = next_notice(&mut updates, 500).await.unwrap();
    let record = transport.get(&notice.entity()).await.unwrap();
    assert_eq!(record.value().unwrap()["on"], json!(true));
}

#[tokio::test]
async fn cancelled_subscription_stops_delivery() {
    let store = MemoryStore::new();
    let transport = transport(&store);
    let updates = transport.updated(UpdateFilter::all()).await.unwrap();
    assert_eq!(transport.watcher_count(), 1);

    drop(updates);
    transport
        .put(&EntityRef::new("a", "b"), doc(json!({})), PutOptions::default())
        .await
        .unwrap();

    assert_eq!(transport.watcher_count(), 0);
}
