use std::time::Duration;

use redis_transport::store::FaultPoint;
use redis_transport::store::MemoryStore;
use redis_transport::ConnectionState;
use redis_transport::Document;
use redis_transport::EntityRef;
use redis_transport::Error;
use redis_transport::PutOptions;
use redis_transport::StoreError;
use redis_transport::Transport;
use redis_transport::TransportConfig;

use crate::common::transport;
use crate::common::transport_with;

#[tokio::test]
async fn queued_operations_complete_after_ready() {
    let store = MemoryStore::new();
    store.hold_connections();
    let transport = transport(&store);

    let mut tasks = Vec::new();
    for i in 0..20 {
        let transport = transport.clone();
        tasks.push(tokio::spawn(async move {
            transport
                .put(
                    &EntityRef::new(format!("e{i}"), "meta"),
                    Document::new(),
                    PutOptions::default(),
                )
                .await
        }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.state(), ConnectionState::Unresolved);
    assert!(tasks.iter().all(|t| !t.is_finished()));

    store.release();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(transport.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn queued_operations_complete_with_unavailable_on_failure() {
    let store = MemoryStore::new();
    store.hold_connections();
    store.fail(FaultPoint::Select, StoreError::Select {
        db: 2,
        message: "ERR DB index is out of range".into(),
    });
    let transport = transport(&store);

    let mut tasks = Vec::new();
    for i in 0..5 {
        let transport = transport.clone();
        tasks.push(tokio::spawn(async move {
            transport.get(&EntityRef::new(format!("e{i}"), "meta")).await
        }));
    }

    store.release();
    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_unavailable(), "{err}");
    }
    assert!(matches!(
        transport.state(),
        ConnectionState::Failed(StoreError::Select { db: 2, .. })
    ));
}

#[tokio::test]
async fn operations_after_failure_do_not_hang() {
    let store = MemoryStore::with_password("secret");
    let transport = transport(&store);

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        transport.get(&EntityRef::new("a", "meta")),
    )
    .await
    .expect("must complete");

    assert!(matches!(
        result,
        Err(Error::ConnectionUnavailable(StoreError::Auth(_)))
    ));
}

#[tokio::test]
async fn password_and_database_are_applied() {
    let store = MemoryStore::with_password("secret");
    let mut config = TransportConfig::default();
    config.store.password = Some("secret".into());
    config.store.db = Some(5);
    let transport = transport_with(&store, config);

    transport
        .put(&EntityRef::new("a", "meta"), Document::new(), PutOptions::default())
        .await
        .unwrap();

    assert_eq!(store.keys(5), vec!["/a/meta"]);
    assert!(store.keys(2).is_empty());
}

#[tokio::test]
async fn refresh_recovers_from_failure() {
    let store = MemoryStore::new();
    store.fail(FaultPoint::Connect, StoreError::Connect("refused".into()));
    let transport = transport(&store);
    assert!(transport.wait_ready().await.is_err());

    store.clear_faults();
    transport.refresh().await.unwrap();

    assert_eq!(transport.state(), ConnectionState::Ready);
    assert!(transport.get(&EntityRef::new("a", "meta")).await.is_ok());
}
