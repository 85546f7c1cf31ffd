use std::collections::HashSet;

use futures::StreamExt;
use redis_transport::channel::AddressScheme;
use redis_transport::channel::PathScheme;
use redis_transport::store::MemoryStore;
use redis_transport::ListFilter;
use redis_transport::ListItem;
use redis_transport::Transport;

use crate::common::transport;
use crate::common::DB;

#[test]
fn addresses_round_trip() {
    let ids = ["plain", "with/slash", "dots.and.more", "100%", "#$[]", "ünïcode", "a b"];
    let bands = ["meta", "v1.2", "x/y"];

    for prefix in ["/", "app/", "app"] {
        let scheme = PathScheme::new(prefix);
        for id in ids {
            for band in bands {
                let channel = scheme.channel(Some(id), Some(band));
                assert_eq!(
                    scheme.unchannel(&channel),
                    Some((id.to_string(), band.to_string())),
                    "{prefix:?} {channel:?}"
                );
            }
        }
    }
}

#[tokio::test]
async fn enumeration_is_independent_of_page_size() {
    let store = MemoryStore::new();
    let ids = 13;
    for id in 0..ids {
        for band in 0..(id % 4 + 1) {
            store.insert_raw(DB, format!("/entity{id}/band{band}"), b"{}".to_vec());
        }
    }
    let transport = transport(&store);

    for page in [1, 3, 10, 1000] {
        store.set_page_size(page);
        let items: Vec<_> = transport.list(ListFilter::all()).collect().await;

        let ends = items
            .iter()
            .filter(|i| matches!(i, Ok(ListItem::End)))
            .count();
        let found: Vec<String> = items
            .into_iter()
            .filter_map(|i| match i {
                Ok(ListItem::Entity { id }) => Some(id),
                _ => None,
            })
            .collect();
        let distinct: HashSet<_> = found.iter().cloned().collect();

        assert_eq!(ends, 1, "page size {page}");
        assert_eq!(found.len(), ids, "page size {page}");
        assert_eq!(distinct.len(), ids, "page size {page}");
    }
}

#[tokio::test]
async fn bands_of_one_entity() {
    let store = MemoryStore::new();
    for key in ["/lamp/state", "/lamp/config", "/lamp2/state"] {
        store.insert_raw(DB, key, b"{}".to_vec());
    }
    let transport = transport(&store);

    let mut bands = transport.bands("lamp").await.unwrap();
    bands.sort();

    assert_eq!(bands, vec!["config", "state"]);
}
