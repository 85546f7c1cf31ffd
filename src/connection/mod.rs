//! Connection lifecycle and the readiness gate.
//!
//! A [`Connection`] runs exactly one initialization sequence in the
//! background:
//!
//! ```text
//! open primary -> AUTH (if password) -> SELECT (if db) ─┐
//!                                                       ├─ notify off ─> Ready
//! open publisher -> AUTH -> SELECT -> open subscriber <─┘ notify on  ─> Ready
//!                  any failure ───────────────────────────────────────> Failed
//! ```
//!
//! Callers that [`acquire`](Connection::acquire) a link before the sequence
//! finishes are parked on a watch channel and resume once it settles. The
//! state only ever moves out of `Unresolved`; a failed connection stays failed
//! until its owner builds a new one.


use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::config::StoreConfig;
use crate::config::TransportConfig;
use crate::store::StoreClient;
use crate::store::StoreConnector;
use crate::store::StoreMessage;
use crate::store::StoreSubscriber;
use crate::Error;
use crate::Result;
use crate::ScopedTimer;
use crate::StoreError;

/// Public view of the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unresolved,
    Ready,
    Failed(StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Reads, writes and scans
    Primary,
    /// Change notices after writes
    Publish,
    /// Pattern subscriptions
    Subscribe,
}

#[derive(Clone)]
pub enum StoreLink {
    Client(Arc<dyn StoreClient>),
    Subscriber(Arc<dyn StoreSubscriber>),
}

struct Links {
    primary: Arc<dyn StoreClient>,
    publisher: Option<Arc<dyn StoreClient>>,
    subscriber: Option<Arc<dyn StoreSubscriber>>,
}

#[derive(Clone)]
enum LinkState {
    Unresolved,
    Ready(Arc<Links>),
    Failed(StoreError),
}

pub struct Connection {
    state_tx: Arc<watch::Sender<LinkState>>,
    init: JoinHandle<()>,
}

impl Connection {
    /// Starts the initialization sequence and returns immediately.
    ///
    /// Messages from the subscribe link flow into `sink`. Must be called from
    /// within a tokio runtime.
    pub fn open(
        transport_id: &str,
        connector: Arc<dyn StoreConnector>,
        config: &TransportConfig,
        sink: mpsc::UnboundedSender<StoreMessage>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Unresolved);
        let state_tx = Arc::new(state_tx);

        let init = {
            let state_tx = state_tx.clone();
            let transport_id = transport_id.to_string();
            let store = config.store.clone();
            let notify = config.notify.enabled;

            tokio::spawn(async move {
                let _timer = ScopedTimer::new("connection_init");
                let init = AssertUnwindSafe(initialize(connector.as_ref(), &store, notify, sink));
                let outcome = init
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(StoreError::Connect(panic_message(panic))));
                let next = match outcome {
                    Ok(links) => {
                        info!(transport = %transport_id, host = %store.host, db = ?store.selected_db(), "store connection ready");
                        LinkState::Ready(Arc::new(links))
                    }
                    Err(e) => {
                        error!(transport = %transport_id, host = %store.host, error = %e, "store connection failed");
                        LinkState::Failed(e)
                    }
                };
                settle(&state_tx, next);
            })
        };

        Self { state_tx, init }
    }

    pub fn state(&self) -> ConnectionState {
        match &*self.state_tx.borrow() {
            LinkState::Unresolved => ConnectionState::Unresolved,
            LinkState::Ready(_) => ConnectionState::Ready,
            LinkState::Failed(e) => ConnectionState::Failed(e.clone()),
        }
    }

    /// Waits for the initialization sequence to settle.
    ///
    /// Callers that need a deadline wrap this (or any operation) in
    /// `tokio::time::timeout`; the connection imposes none of its own.
    pub async fn wait_ready(&self) -> Result<()> {
        self.ready_links().await.map(|_| ())
    }

    /// Returns the link serving `role`, waiting for readiness if needed.
    ///
    /// `Ok(None)` is returned for the publish and subscribe roles when
    /// notification is disabled; callers treat it as "nothing to do".
    pub async fn acquire(
        &self,
        role: LinkRole,
    ) -> Result<Option<StoreLink>> {
        let links = self.ready_links().await?;
        Ok(match role {
            LinkRole::Primary => Some(StoreLink::Client(links.primary.clone())),
            LinkRole::Publish => links.publisher.clone().map(StoreLink::Client),
            LinkRole::Subscribe => links.subscriber.clone().map(StoreLink::Subscriber),
        })
    }

    pub async fn primary(&self) -> Result<Arc<dyn StoreClient>> {
        match self.acquire(LinkRole::Primary).await? {
            Some(StoreLink::Client(client)) => Ok(client),
            _ => Err(Error::ConnectionUnavailable(StoreError::Closed)),
        }
    }

    pub async fn publisher(&self) -> Result<Option<Arc<dyn StoreClient>>> {
        match self.acquire(LinkRole::Publish).await? {
            Some(StoreLink::Client(client)) => Ok(Some(client)),
            _ => Ok(None),
        }
    }

    pub async fn subscriber(&self) -> Result<Option<Arc<dyn StoreSubscriber>>> {
        match self.acquire(LinkRole::Subscribe).await? {
            Some(StoreLink::Subscriber(subscriber)) => Ok(Some(subscriber)),
            _ => Ok(None),
        }
    }

    async fn ready_links(&self) -> Result<Arc<Links>> {
        let mut state_rx = self.state_tx.subscribe();
        let state = state_rx
            .wait_for(|state| !matches!(state, LinkState::Unresolved))
            .await
            .map(|state| state.clone())
            .map_err(|_| Error::ConnectionUnavailable(StoreError::Closed))?;

        match state {
            LinkState::Ready(links) => Ok(links),
            LinkState::Failed(e) => Err(Error::ConnectionUnavailable(e)),
            LinkState::Unresolved => Err(Error::ConnectionUnavailable(StoreError::Closed)),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.init.abort();
        // Parked callers must not wait on an init that will never finish
        settle(&self.state_tx, LinkState::Failed(StoreError::Closed));
    }
}

/// Moves out of `Unresolved` once. Later transitions are ignored.
fn settle(
    state_tx: &watch::Sender<LinkState>,
    next: LinkState,
) {
    state_tx.send_if_modified(|current| {
        if matches!(current, LinkState::Unresolved) {
            *current = next;
            true
        } else {
            false
        }
    });
}

// A panicking connector settles the state like any other failure.
fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("initialization panicked: {detail}")
}

async fn initialize(
    connector: &dyn StoreConnector,
    store: &StoreConfig,
    notify: bool,
    sink: mpsc::UnboundedSender<StoreMessage>,
) -> std::result::Result<Links, StoreError> {
    let primary = prepare_client(connector, store).await?;
    if !notify {
        return Ok(Links {
            primary,
            publisher: None,
            subscriber: None,
        });
    }

    let publisher = prepare_client(connector, store).await?;
    let subscriber = connector.open_subscriber(sink).await?;
    Ok(Links {
        primary,
        publisher: Some(publisher),
        subscriber: Some(subscriber),
    })
}

async fn prepare_client(
    connector: &dyn StoreConnector,
    store: &StoreConfig,
) -> std::result::Result<Arc<dyn StoreClient>, StoreError> {
    let client = connector.open_client().await?;

    if let Some(password) = &store.password {
        debug!("authorizing");
        client.auth(password).await?;
    }
    if let Some(db) = store.selected_db() {
        debug!(db, "selecting database");
        client.select(db).await?;
    }
    Ok(client)
}
