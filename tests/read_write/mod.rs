use redis_transport::codec::format_timestamp;
use redis_transport::store::MemoryStore;
use redis_transport::EntityRef;
use redis_transport::Error;
use redis_transport::ListFilter;
use redis_transport::ListItem;
use redis_transport::Payload;
use redis_transport::PutOptions;
use redis_transport::Transport;
use serde_json::json;

use futures::StreamExt;

use crate::common::at;
use crate::common::doc;
use crate::common::frozen_transport;
use crate::common::stored;
use crate::common::transport;

#[tokio::test]
async fn put_get_list_on_empty_store() {
    let store = MemoryStore::new();
    let transport = frozen_transport(&store, 0);
    let entity = EntityRef::new("A", "meta");

    transport
        .put(&entity, doc(json!({"name": "x"})), PutOptions::default())
        .await
        .unwrap();
    let record = transport.get(&entity).await.unwrap();
    let items: Vec<_> = transport.list(ListFilter::all()).collect().await;

    assert_eq!(
        record.value,
        Payload::Present(doc(json!({"name": "x", "@timestamp": format_timestamp(at(0))})))
    );
    assert!(matches!(
        items.as_slice(),
        [Ok(ListItem::Entity { id }), Ok(ListItem::End)] if id == "A"
    ));
}

#[tokio::test]
async fn concurrency_law() {
    let store = MemoryStore::new();
    let transport = transport(&store);
    let entity = EntityRef::new("sensor", "reading");
    let t1 = format_timestamp(at(100));
    let original = json!({"celsius": 20, "@timestamp": t1});
    transport
        .put(&entity, doc(original.clone()), PutOptions::default())
        .await
        .unwrap();

    for older in [100, 99, 0] {
        let attempt = json!({"celsius": 99, "@timestamp": format_timestamp(at(older))});
        let err = transport
            .put(&entity, doc(attempt), PutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleWrite { .. }));
        assert_eq!(stored(&store, "/sensor/reading"), Some(original.clone()));
    }

    let newer = json!({"celsius": 21, "@timestamp": format_timestamp(at(101))});
    transport
        .put(&entity, doc(newer.clone()), PutOptions::default())
        .await
        .unwrap();
    let record = transport.get(&entity).await.unwrap();
    assert_eq!(record.value, Payload::Present(doc(newer)));
}

#[tokio::test]
async fn rapid_puts_with_same_clock_value() {
    let store = MemoryStore::new();
    let transport = frozen_transport(&store, 7);
    let entity = EntityRef::new("A", "meta");

    let first = transport
        .put(&entity, doc(json!({"n": 1})), PutOptions::default())
        .await;
    let second = transport
        .put(&entity, doc(json!({"n": 2})), PutOptions::default())
        .await;

    assert!(first.is_ok());
    assert!(second.unwrap_err().is_stale_write());
    assert_eq!(stored(&store, "/A/meta").unwrap()["n"], json!(1));
}

#[tokio::test]
async fn missing_value_reads_as_missing() {
    let store = MemoryStore::new();
    let transport = transport(&store);

    let record = transport.get(&EntityRef::new("ghost", "meta")).await.unwrap();

    assert_eq!(record.value, Payload::Missing);
}

#[tokio::test]
async fn remove_leaves_data_in_place() {
    let store = MemoryStore::new();
    let transport = transport(&store);
    let entity = EntityRef::new("A", "meta");
    transport
        .put(&entity, doc(json!({"n": 1})), PutOptions::default())
        .await
        .unwrap();

    let err = transport.remove(&entity).await.unwrap_err();

    assert!(matches!(err, Error::NotImplemented { .. }));
    assert!(stored(&store, "/A/meta").is_some());
}

#[tokio::test]
async fn awkward_ids_survive_storage() {
    let store = MemoryStore::new();
    let transport = transport(&store);

    for id in ["urn:dev/1", "50%", "a.b", "[x]", "#tag", "$home"] {
        let entity = EntityRef::new(id, "meta");
        transport
            .put(&entity, doc(json!({"id": id})), PutOptions::unchecked())
            .await
            .unwrap();
        let record = transport.get(&entity).await.unwrap();
        assert_eq!(record.value().unwrap()["id"], json!(id));
    }
}
