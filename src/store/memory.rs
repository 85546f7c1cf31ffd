//! In-process store with the command semantics the transport relies on.
//!
//! Used by tests and demos in place of a server. Every `open_client` is a new
//! link that starts unauthenticated on database 0, like a real connection.
//! Faults can be injected per command, and new links can be held back behind a
//! gate to observe behaviour before readiness.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::trace;

use super::glob_match;
use super::StoreClient;
use super::StoreConnector;
use super::StoreMessage;
use super::StoreResult;
use super::StoreSubscriber;
use crate::constants::MAX_DB_INDEX;
use crate::StoreError;

/// Command a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Connect,
    Subscribe,
    Auth,
    Select,
    Get,
    Set,
    Scan,
    Publish,
}

#[derive(Debug, Clone)]
struct Fault {
    /// Calls that still succeed before the fault fires
    remaining_ok: usize,
    error: StoreError,
}

#[derive(Default)]
struct MemoryState {
    dbs: HashMap<i64, BTreeMap<String, Vec<u8>>>,
    subscribers: Vec<SubscriberEntry>,
    faults: HashMap<FaultPoint, Fault>,
    published: Vec<String>,
}

struct SubscriberEntry {
    id: u64,
    patterns: HashSet<String>,
    sink: mpsc::UnboundedSender<StoreMessage>,
}

struct MemoryInner {
    password: Option<String>,
    page_size: AtomicUsize,
    state: Mutex<MemoryState>,
    gate: watch::Sender<bool>,
    next_subscriber_id: AtomicU64,
    connects: AtomicUsize,
    psubscribes: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Store that answers NOAUTH until a link authenticates with `password`.
    pub fn with_password(password: impl Into<String>) -> Self {
        Self::build(Some(password.into()))
    }

    fn build(password: Option<String>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(MemoryInner {
                password,
                page_size: AtomicUsize::new(0),
                state: Mutex::new(MemoryState::default()),
                gate,
                next_subscriber_id: AtomicU64::new(1),
                connects: AtomicUsize::new(0),
                psubscribes: AtomicUsize::new(0),
            }),
        }
    }

    /// Forces SCAN pages to hold at most `size` keys regardless of the COUNT
    /// hint. `0` restores the hint.
    pub fn set_page_size(
        &self,
        size: usize,
    ) {
        self.inner.page_size.store(size, Ordering::SeqCst);
    }

    /// New links wait until [`release`](Self::release) is called.
    pub fn hold_connections(&self) {
        self.inner.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Every call to `point` fails with `error` from now on.
    pub fn fail(
        &self,
        point: FaultPoint,
        error: StoreError,
    ) {
        self.fail_after(point, 0, error);
    }

    /// The next `successes` calls to `point` succeed, then every call fails.
    pub fn fail_after(
        &self,
        point: FaultPoint,
        successes: usize,
        error: StoreError,
    ) {
        self.inner.state.lock().faults.insert(
            point,
            Fault {
                remaining_ok: successes,
                error,
            },
        );
    }

    pub fn clear_faults(&self) {
        self.inner.state.lock().faults.clear();
    }

    pub fn insert_raw(
        &self,
        db: i64,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) {
        self.inner
            .state
            .lock()
            .dbs
            .entry(db)
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn raw(
        &self,
        db: i64,
        key: &str,
    ) -> Option<Vec<u8>> {
        self.inner
            .state
            .lock()
            .dbs
            .get(&db)
            .and_then(|keys| keys.get(key).cloned())
    }

    pub fn keys(
        &self,
        db: i64,
    ) -> Vec<String> {
        self.inner
            .state
            .lock()
            .dbs
            .get(&db)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Links opened so far, command and subscribe links alike.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// PSUBSCRIBE commands received across all subscribe links.
    pub fn psubscribe_count(&self) -> usize {
        self.inner.psubscribes.load(Ordering::SeqCst)
    }

    /// Channels published to, in order.
    pub fn published(&self) -> Vec<String> {
        self.inner.state.lock().published.clone()
    }

    /// Delivers a message to every matching pattern subscription, as a
    /// PUBLISH from another client would.
    pub fn publish_raw(
        &self,
        channel: &str,
        payload: &[u8],
    ) -> u64 {
        let mut state = self.inner.state.lock();
        state.published.push(channel.to_string());

        let mut receivers = 0;
        state.subscribers.retain(|subscriber| {
            for pattern in subscriber.patterns.iter().filter(|p| glob_match(p, channel)) {
                let message = StoreMessage {
                    pattern: Some(pattern.clone()),
                    channel: channel.to_string(),
                    payload: payload.to_vec(),
                };
                if subscriber.sink.send(message).is_err() {
                    trace!(subscriber = subscriber.id, "dropping closed subscriber");
                    return false;
                }
                receivers += 1;
            }
            true
        });
        receivers
    }

    fn check_fault(
        &self,
        point: FaultPoint,
    ) -> StoreResult<()> {
        let mut state = self.inner.state.lock();
        match state.faults.get_mut(&point) {
            Some(fault) if fault.remaining_ok > 0 => {
                fault.remaining_ok -= 1;
                Ok(())
            }
            Some(fault) => Err(fault.error.clone()),
            None => Ok(()),
        }
    }

    async fn pass_gate(&self) -> StoreResult<()> {
        let mut gate = self.inner.gate.subscribe();
        gate.wait_for(|open| *open).await.map_err(|_| StoreError::Closed)?;
        Ok(())
    }

    fn scan_page(
        &self,
        db: i64,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> (u64, Vec<String>) {
        let forced = self.inner.page_size.load(Ordering::SeqCst);
        let page = if forced > 0 { forced } else { count.max(1) };

        let state = self.inner.state.lock();
        let Some(keys) = state.dbs.get(&db) else {
            return (0, Vec::new());
        };

        let start = cursor as usize;
        let matched = keys
            .keys()
            .skip(start)
            .take(page)
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        let next = start + page;
        if next >= keys.len() {
            (0, matched)
        } else {
            (next as u64, matched)
        }
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn open_client(&self) -> StoreResult<Arc<dyn StoreClient>> {
        self.pass_gate().await?;
        self.check_fault(FaultPoint::Connect)?;
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MemoryClient {
            store: self.clone(),
            authed: AtomicBool::new(self.inner.password.is_none()),
            db: AtomicI64::new(0),
        }))
    }

    async fn open_subscriber(
        &self,
        sink: mpsc::UnboundedSender<StoreMessage>,
    ) -> StoreResult<Arc<dyn StoreSubscriber>> {
        self.pass_gate().await?;
        self.check_fault(FaultPoint::Connect)?;
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.inner.state.lock().subscribers.push(SubscriberEntry {
            id,
            patterns: HashSet::new(),
            sink,
        });
        Ok(Arc::new(MemorySubscriber {
            store: self.clone(),
            id,
        }))
    }
}

struct MemoryClient {
    store: MemoryStore,
    authed: AtomicBool,
    db: AtomicI64,
}

impl MemoryClient {
    fn ensure_authed(&self) -> StoreResult<()> {
        if self.authed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Command {
                command: "NOAUTH",
                message: "NOAUTH Authentication required.".to_string(),
            })
        }
    }

    fn db(&self) -> i64 {
        self.db.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn auth(
        &self,
        password: &str,
    ) -> StoreResult<()> {
        self.store.check_fault(FaultPoint::Auth)?;
        match &self.store.inner.password {
            Some(expected) if expected == password => {
                self.authed.store(true, Ordering::SeqCst);
                Ok(())
            }
            Some(_) => Err(StoreError::Auth(
                "WRONGPASS invalid username-password pair".to_string(),
            )),
            None => Err(StoreError::Auth(
                "ERR AUTH called without any password configured".to_string(),
            )),
        }
    }

    async fn select(
        &self,
        db: i64,
    ) -> StoreResult<()> {
        self.ensure_authed()?;
        self.store.check_fault(FaultPoint::Select)?;
        if !(0..=MAX_DB_INDEX).contains(&db) {
            return Err(StoreError::Select {
                db,
                message: "ERR DB index is out of range".to_string(),
            });
        }
        self.db.store(db, Ordering::SeqCst);
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_authed()?;
        self.store.check_fault(FaultPoint::Get)?;
        Ok(self.store.raw(self.db(), key))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> StoreResult<()> {
        self.ensure_authed()?;
        self.store.check_fault(FaultPoint::Set)?;
        self.store.insert_raw(self.db(), key, value);
        Ok(())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        self.ensure_authed()?;
        self.store.check_fault(FaultPoint::Scan)?;
        Ok(self.store.scan_page(self.db(), cursor, pattern, count))
    }

    async fn publish(
        &self,
        channel: &str,
        payload: &[u8],
    ) -> StoreResult<u64> {
        self.ensure_authed()?;
        self.store.check_fault(FaultPoint::Publish)?;
        Ok(self.store.publish_raw(channel, payload))
    }
}

struct MemorySubscriber {
    store: MemoryStore,
    id: u64,
}

#[async_trait]
impl StoreSubscriber for MemorySubscriber {
    async fn psubscribe(
        &self,
        pattern: &str,
    ) -> StoreResult<()> {
        self.store.check_fault(FaultPoint::Subscribe)?;
        self.store.inner.psubscribes.fetch_add(1, Ordering::SeqCst);

        let mut state = self.store.inner.state.lock();
        let entry = state
            .subscribers
            .iter_mut()
            .find(|s| s.id == self.id)
            .ok_or(StoreError::Closed)?;
        entry.patterns.insert(pattern.to_string());
        Ok(())
    }
}

impl Drop for MemorySubscriber {
    fn drop(&mut self) {
        self.store.inner.state.lock().subscribers.retain(|s| s.id != self.id);
    }
}
