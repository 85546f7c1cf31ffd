//! Change notice demultiplexing.
//!
//! ```text
//! subscribe link ──> sink (unbounded) ──> dispatcher task
//!                                            │ unchannel topic
//!                                            │ lookup watchers by pattern
//!                                            └─> try_send(per-watcher channel)
//! ```
//!
//! Each distinct pattern is PSUBSCRIBEd once per subscribe link; any number
//! of watchers share it. A watcher whose buffer is full misses the notice;
//! the others still get it. Notices never carry the value, so a watcher that
//! missed one can re-sync with `get`.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Payload;
use super::Record;
use super::UpdateFilter;
use crate::channel::AddressScheme;
use crate::metrics::ACTIVE_WATCHERS;
use crate::metrics::NOTICES_DISPATCHED;
use crate::metrics::NOTICES_DROPPED;
use crate::store::StoreMessage;
use crate::Error;

struct Watcher {
    id: u64,
    filter: UpdateFilter,
    sender: mpsc::Sender<Record>,
}

pub(crate) struct Notifier {
    /// Watchers grouped by the pattern they subscribed with
    watchers: DashMap<String, Vec<Watcher>>,
    next_id: AtomicU64,
    /// Patterns live on the current subscribe link. Held across PSUBSCRIBE
    /// so each pattern is sent once.
    subscribed: Mutex<HashSet<String>>,
    buffer_size: usize,
    verbose: bool,
}

impl Notifier {
    pub(crate) fn new(
        buffer_size: usize,
        verbose: bool,
    ) -> Self {
        Self {
            watchers: DashMap::new(),
            next_id: AtomicU64::new(1),
            subscribed: Mutex::new(HashSet::new()),
            buffer_size,
            verbose,
        }
    }

    pub(crate) fn register(
        self: &Arc<Self>,
        pattern: String,
        filter: UpdateFilter,
    ) -> (mpsc::Receiver<Record>, WatcherGuard) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer_size);

        self.watchers.entry(pattern.clone()).or_default().push(Watcher {
            id,
            filter,
            sender,
        });
        ACTIVE_WATCHERS.inc();
        trace!(watcher_id = id, %pattern, "watcher registered");

        let guard = WatcherGuard {
            id,
            pattern,
            notifier: self.clone(),
        };
        (receiver, guard)
    }

    pub(crate) fn watcher_count(&self) -> usize {
        self.watchers.iter().map(|entry| entry.value().len()).sum()
    }

    /// Patterns subscribed on the current link. Keep the guard while
    /// subscribing or swapping links.
    pub(crate) async fn patterns(&self) -> MutexGuard<'_, HashSet<String>> {
        self.subscribed.lock().await
    }

    /// Routes one store message to the watchers of its pattern.
    pub(crate) fn dispatch(
        &self,
        scheme: &dyn AddressScheme,
        message: StoreMessage,
    ) {
        let Some(pattern) = message.pattern else {
            trace!(channel = %message.channel, "ignoring non-pattern message");
            return;
        };

        let Some((id, band)) = scheme.unchannel(&message.channel) else {
            trace!(error = %Error::MalformedTopic(message.channel), "dropping notice");
            return;
        };

        let Some(watchers) = self.watchers.get(&pattern) else {
            return;
        };

        for watcher in watchers.iter().filter(|w| w.filter.matches(&id, &band)) {
            let record = Record {
                id: id.clone(),
                band: band.clone(),
                value: Payload::Deferred,
            };
            match watcher.sender.try_send(record) {
                Ok(()) => {
                    NOTICES_DISPATCHED.inc();
                    if self.verbose {
                        info!(watcher_id = watcher.id, %id, %band, "notice dispatched");
                    }
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    NOTICES_DROPPED.inc();
                    warn!(watcher_id = watcher.id, %id, %band, "watcher buffer full, notice dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(watcher_id = watcher.id, "watcher closed");
                }
            }
        }
    }

    fn unregister(
        &self,
        id: u64,
        pattern: &str,
    ) {
        let mut removed = false;
        self.watchers.remove_if_mut(pattern, |_, watchers| {
            let before = watchers.len();
            watchers.retain(|w| w.id != id);
            removed = watchers.len() < before;
            watchers.is_empty()
        });
        if removed {
            ACTIVE_WATCHERS.dec();
        }
    }
}

/// Consumes store messages until the sink closes.
pub(crate) fn spawn_dispatcher(
    notifier: Arc<Notifier>,
    scheme: Arc<dyn AddressScheme>,
    mut messages: mpsc::UnboundedReceiver<StoreMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            notifier.dispatch(scheme.as_ref(), message);
        }
        debug!("notice dispatcher stopped");
    })
}

/// Unregisters a watcher when dropped.
pub(crate) struct WatcherGuard {
    id: u64,
    pattern: String,
    notifier: Arc<Notifier>,
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.notifier.unregister(self.id, &self.pattern);
        trace!(watcher_id = self.id, pattern = %self.pattern, "watcher unregistered");
    }
}

/// Change notices for one `updated` call.
///
/// Yields records whose value is [`Payload::Deferred`]. Dropping the stream
/// stops delivery; the store-level subscription is kept for later watchers.
pub struct Updates {
    receiver: mpsc::Receiver<Record>,
    _guard: Option<WatcherGuard>,
}

impl Updates {
    pub(crate) fn new(
        receiver: mpsc::Receiver<Record>,
        guard: WatcherGuard,
    ) -> Self {
        Self {
            receiver,
            _guard: Some(guard),
        }
    }

    /// A stream that ends immediately, used when notification is disabled.
    pub(crate) fn closed() -> Self {
        let (_, receiver) = mpsc::channel(1);
        Self {
            receiver,
            _guard: None,
        }
    }

    pub async fn recv(&mut self) -> Option<Record> {
        self.receiver.recv().await
    }
}

impl Stream for Updates {
    type Item = Record;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
