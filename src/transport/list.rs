//! Prefix-scan enumeration.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream;
use futures::StreamExt;
use tracing::debug;

use super::ListItem;
use super::ListStream;
use super::TransportInner;
use crate::channel::AddressScheme;
use crate::store::StoreClient;
use crate::Error;
use crate::Result;
use crate::StoreError;

enum Phase {
    Scanning,
    /// Cursor returned to zero; only buffered ids and the end marker remain
    Exhausted,
    Done,
}

struct ScanState {
    /// Released once the primary client is in hand, so a live listing never
    /// pins a connection that `refresh` has replaced.
    transport: Option<Arc<TransportInner>>,
    scheme: Arc<dyn AddressScheme>,
    pattern: String,
    only_id: Option<String>,
    count: usize,
    client: Option<Arc<dyn StoreClient>>,
    cursor: u64,
    seen: HashSet<String>,
    pending: VecDeque<String>,
    phase: Phase,
}

impl ScanState {
    fn accept(
        &mut self,
        keys: Vec<String>,
    ) {
        for key in keys {
            let Some((id, _band)) = self.scheme.unchannel(&key) else {
                continue;
            };
            if self.only_id.as_deref().is_some_and(|want| want != id) {
                continue;
            }
            if self.seen.insert(id.clone()) {
                self.pending.push_back(id);
            }
        }
    }

    async fn client(&mut self) -> Result<Arc<dyn StoreClient>> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let Some(transport) = self.transport.take() else {
            return Err(Error::ConnectionUnavailable(StoreError::Closed));
        };
        let connection = transport.connection.load_full();
        drop(transport);

        let client = connection.primary().await?;
        self.client = Some(client.clone());
        Ok(client)
    }
}

/// Lazily scans `pattern` and yields each distinct entity id once, in
/// first-seen order, then [`ListItem::End`].
///
/// The connection is looked up on first poll, not when the stream is built.
pub(crate) fn entity_stream(
    transport: Arc<TransportInner>,
    pattern: String,
    only_id: Option<String>,
) -> ListStream {
    let state = ScanState {
        scheme: transport.scheme.clone(),
        count: transport.config.store.scan_count,
        transport: Some(transport),
        pattern,
        only_id,
        client: None,
        cursor: 0,
        seen: HashSet::new(),
        pending: VecDeque::new(),
        phase: Phase::Scanning,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(id) = state.pending.pop_front() {
                return Some((Ok(ListItem::Entity { id }), state));
            }
            match state.phase {
                Phase::Done => return None,
                Phase::Exhausted => {
                    state.phase = Phase::Done;
                    debug!(pattern = %state.pattern, entities = state.seen.len(), "listing complete");
                    return Some((Ok(ListItem::End), state));
                }
                Phase::Scanning => {}
            }

            let client = match state.client().await {
                Ok(client) => client,
                Err(e) => {
                    state.phase = Phase::Done;
                    return Some((Err(e), state));
                }
            };

            match client.scan(state.cursor, &state.pattern, state.count).await {
                Ok((next, keys)) => {
                    state.accept(keys);
                    if next == 0 {
                        state.phase = Phase::Exhausted;
                    } else {
                        state.cursor = next;
                    }
                }
                Err(e) => {
                    state.phase = Phase::Done;
                    return Some((Err(Error::ScanFailure(e)), state));
                }
            }
        }
    })
    .boxed()
}

/// Collects the distinct bands stored under one entity.
pub(crate) async fn collect_bands(
    client: &dyn StoreClient,
    scheme: &dyn AddressScheme,
    id: &str,
    count: usize,
) -> Result<Vec<String>> {
    let pattern = scheme.scan_pattern(Some(id));
    let mut seen = HashSet::new();
    let mut bands = Vec::new();
    let mut cursor = 0;

    loop {
        let (next, keys) = client
            .scan(cursor, &pattern, count)
            .await
            .map_err(Error::ScanFailure)?;

        for key in keys {
            if let Some((key_id, band)) = scheme.unchannel(&key) {
                if key_id == id && seen.insert(band.clone()) {
                    bands.push(band);
                }
            }
        }

        if next == 0 {
            return Ok(bands);
        }
        cursor = next;
    }
}
