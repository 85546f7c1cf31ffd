use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;

use super::notify::Notifier;
use super::*;
use crate::channel::PathScheme;
use crate::store::MemoryStore;
use crate::store::StoreMessage;
use crate::test_utils::doc;
use crate::test_utils::memory_transport;
use crate::test_utils::next_notice;
use crate::test_utils::test_config;

async fn write(
    transport: &StoreTransport,
    id: &str,
    band: &str,
) {
    transport
        .put(
            &EntityRef::new(id, band),
            doc(json!({"v": 1})),
            PutOptions::unchecked(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn notices_carry_no_value() {
    let store = MemoryStore::new();
    let transport = memory_transport(&store, test_config());
    let mut updates = transport.updated(UpdateFilter::all()).await.unwrap();

    write(&transport, "lamp", "state").await;

    let record = next_notice(&mut updates, 500).await.unwrap();
    assert_eq!(record.id, "lamp");
    assert_eq!(record.band, "state");
    assert_eq!(record.value, Payload::Deferred);
}

#[tokio::test]
async fn id_filter_excludes_other_entities() {
    let store = MemoryStore::new();
    let transport = memory_transport(&store, test_config());
    let mut only_x = transport.updated(UpdateFilter::new(Some("X"), None)).await.unwrap();
    let mut everything = transport.updated(UpdateFilter::all()).await.unwrap();

    write(&transport, "Y", "meta").await;
    write(&transport, "X", "meta").await;

    let first = next_notice(&mut only_x, 500).await.unwrap();
    assert_eq!(first.id, "X");
    assert!(next_notice(&mut only_x, 50).await.is_none());

    let mut seen = vec![
        next_notice(&mut everything, 500).await.unwrap().id,
        next_notice(&mut everything, 500).await.unwrap().id,
    ];
    seen.sort();
    assert_eq!(seen, vec!["X", "Y"]);
}

#[tokio::test]
async fn band_filter_matches_exactly() {
    let store = MemoryStore::new();
    let transport = memory_transport(&store, test_config());
    let mut meta = transport.updated(UpdateFilter::new(None, Some("meta"))).await.unwrap();

    write(&transport, "a", "metadata").await;
    write(&transport, "a", "meta").await;

    assert_eq!(next_notice(&mut meta, 500).await.unwrap().band, "meta");
    assert!(next_notice(&mut meta, 50).await.is_none());
}

#[tokio::test]
async fn identical_patterns_share_one_subscription() {
    let store = MemoryStore::new();
    let transport = memory_transport(&store, test_config());

    let mut first = transport.updated(UpdateFilter::new(Some("a"), None)).await.unwrap();
    let mut second = transport.updated(UpdateFilter::new(Some("a"), None)).await.unwrap();
    let _other = transport.updated(UpdateFilter::all()).await.unwrap();
    assert_eq!(store.psubscribe_count(), 2);

    write(&transport, "a", "meta").await;

    assert_eq!(next_notice(&mut first, 500).await.unwrap().id, "a");
    assert_eq!(next_notice(&mut second, 500).await.unwrap().id, "a");
    // one delivery per watcher, even with two matching patterns
    assert!(next_notice(&mut first, 50).await.is_none());
}

#[tokio::test]
async fn dropping_updates_unregisters_the_watcher() {
    let store = MemoryStore::new();
    let transport = memory_transport(&store, test_config());

    let updates = transport.updated(UpdateFilter::all()).await.unwrap();
    let _kept = transport.updated(UpdateFilter::all()).await.unwrap();
    assert_eq!(transport.watcher_count(), 2);

    drop(updates);
    assert_eq!(transport.watcher_count(), 1);

    // the store-level subscription stays for later watchers
    let _again = transport.updated(UpdateFilter::all()).await.unwrap();
    assert_eq!(store.psubscribe_count(), 1);
}

#[tokio::test]
async fn foreign_publishes_are_delivered() {
    let store = MemoryStore::new();
    let transport = memory_transport(&store, test_config());
    let mut updates = transport.updated(UpdateFilter::all()).await.unwrap();

    store.publish_raw("/from%2eelsewhere/meta", b"ignored payload");

    let record = updates.next().await.unwrap();
    assert_eq!(record.id, "from.elsewhere");
    assert_eq!(record.value, Payload::Deferred);
}

#[tokio::test]
async fn disabled_notification_yields_an_ended_stream() {
    let store = MemoryStore::new();
    let mut config = test_config();
    config.notify.enabled = false;
    let transport = memory_transport(&store, config);

    let mut updates = transport.updated(UpdateFilter::all()).await.unwrap();
    write(&transport, "a", "meta").await;

    assert!(updates.next().await.is_none());
    assert!(store.published().is_empty());
    assert_eq!(store.psubscribe_count(), 0);
}

#[tokio::test]
async fn empty_filter_segments_are_rejected() {
    let store = MemoryStore::new();
    let transport = memory_transport(&store, test_config());

    let result = transport.updated(UpdateFilter::new(Some(""), None)).await;

    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn refresh_resubscribes_live_patterns() {
    let store = MemoryStore::new();
    let transport = memory_transport(&store, test_config());
    let mut updates = transport.updated(UpdateFilter::new(Some("a"), None)).await.unwrap();
    assert_eq!(store.psubscribe_count(), 1);

    transport.refresh().await.unwrap();
    assert_eq!(store.psubscribe_count(), 2);

    write(&transport, "a", "meta").await;
    assert_eq!(next_notice(&mut updates, 500).await.unwrap().id, "a");
}

#[tokio::test]
async fn listing_in_progress_does_not_keep_old_subscriber_after_refresh() {
    let store = MemoryStore::new();
    for key in ["/a/meta", "/b/meta", "/c/meta"] {
        store.insert_raw(2, key, b"{}".to_vec());
    }
    store.set_page_size(1);
    let transport = memory_transport(&store, test_config());
    let mut updates = transport.updated(UpdateFilter::all()).await.unwrap();

    let mut started = transport.list(ListFilter::all());
    assert!(matches!(started.next().await, Some(Ok(ListItem::Entity { .. }))));
    let unpolled = transport.list(ListFilter::all());

    transport.refresh().await.unwrap();
    write(&transport, "a", "meta").await;

    assert_eq!(next_notice(&mut updates, 500).await.unwrap().id, "a");
    assert!(next_notice(&mut updates, 50).await.is_none());

    // both listings still finish on their own links
    let rest: Vec<_> = started.collect().await;
    assert!(matches!(rest.last(), Some(Ok(ListItem::End))));
    let all: Vec<_> = unpolled.collect().await;
    assert_eq!(all.len(), 4);
}

fn message(
    pattern: &str,
    channel: &str,
) -> StoreMessage {
    StoreMessage {
        pattern: Some(pattern.to_string()),
        channel: channel.to_string(),
        payload: Vec::new(),
    }
}

#[tokio::test]
async fn dispatch_drops_malformed_topics() {
    let notifier = Arc::new(Notifier::new(4, false));
    let scheme = PathScheme::new("/");
    let (mut receiver, _guard) = notifier.register("/*/*".into(), UpdateFilter::all());

    notifier.dispatch(&scheme, message("/*/*", "/no-band"));
    notifier.dispatch(&scheme, message("/*/*", "/a/b/c"));
    notifier.dispatch(&scheme, message("/*/*", "/a/b"));

    assert_eq!(receiver.recv().await.unwrap().id, "a");
    assert!(receiver.try_recv().is_err());
}

#[tokio::test]
async fn full_watcher_buffer_drops_only_for_that_watcher() {
    let notifier = Arc::new(Notifier::new(1, false));
    let scheme = PathScheme::new("/");
    let (mut slow, _slow_guard) = notifier.register("/*/*".into(), UpdateFilter::all());
    let (mut fast, _fast_guard) = notifier.register("/*/*".into(), UpdateFilter::all());

    notifier.dispatch(&scheme, message("/*/*", "/a/meta"));
    assert_eq!(fast.recv().await.unwrap().id, "a");
    notifier.dispatch(&scheme, message("/*/*", "/b/meta"));

    assert_eq!(slow.recv().await.unwrap().id, "a");
    assert!(slow.try_recv().is_err());
    assert_eq!(fast.recv().await.unwrap().id, "b");
}

#[tokio::test]
async fn messages_without_a_pattern_are_ignored() {
    let notifier = Arc::new(Notifier::new(4, false));
    let scheme = PathScheme::new("/");
    let (mut receiver, _guard) = notifier.register("/*/*".into(), UpdateFilter::all());

    notifier.dispatch(
        &scheme,
        StoreMessage {
            pattern: None,
            channel: "/a/b".into(),
            payload: Vec::new(),
        },
    );

    assert!(receiver.try_recv().is_err());
}
