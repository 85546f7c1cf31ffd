use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::list::collect_bands;
use super::list::entity_stream;
use super::notify::Notifier;
use super::notify::Updates;
use super::EntityRef;
use super::ListFilter;
use super::ListStream;
use super::Payload;
use super::PutOptions;
use super::Record;
use super::Transport;
use super::TransportBuilder;
use super::UpdateFilter;
use crate::channel::AddressScheme;
use crate::codec::compact;
use crate::codec::stamp;
use crate::codec::timestamp_of;
use crate::codec::write_allowed;
use crate::codec::Clock;
use crate::codec::ValueCodec;
use crate::config::TransportConfig;
use crate::connection::Connection;
use crate::connection::ConnectionState;
use crate::metrics::record_outcome;
use crate::metrics::STALE_WRITES;
use crate::store::StoreConnector;
use crate::store::StoreMessage;
use crate::Document;
use crate::Error;
use crate::Result;
use crate::ScopedTimer;
use crate::StoreError;

/// [`Transport`] over a key/value store reached through a [`StoreConnector`].
///
/// Cheap to clone; clones share the connection and the watcher registry.
#[derive(Clone)]
pub struct StoreTransport {
    inner: Arc<TransportInner>,
}

pub(crate) struct TransportInner {
    pub(crate) id: String,
    pub(crate) config: TransportConfig,
    pub(crate) scheme: Arc<dyn AddressScheme>,
    pub(crate) codec: Arc<dyn ValueCodec>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) connector: Arc<dyn StoreConnector>,
    pub(crate) connection: ArcSwap<Connection>,
    pub(crate) notifier: Arc<Notifier>,
    pub(crate) sink: mpsc::UnboundedSender<StoreMessage>,
    pub(crate) dispatcher: JoinHandle<()>,
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

impl StoreTransport {
    pub fn builder(config: TransportConfig) -> TransportBuilder {
        TransportBuilder::new(config)
    }

    pub(crate) fn from_inner(inner: TransportInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Instance id carried in log fields.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.load().state()
    }

    /// Waits until the current connection is ready or has failed.
    pub async fn wait_ready(&self) -> Result<()> {
        self.inner.connection.load_full().wait_ready().await
    }

    /// Replaces the connection with a freshly initialized one.
    ///
    /// The new connection must become ready before it is swapped in; on
    /// failure the current one is kept and the error returned. Live
    /// notification patterns are subscribed again on the new link.
    pub async fn refresh(&self) -> Result<()> {
        let inner = &self.inner;
        let connection = Arc::new(Connection::open(
            &inner.id,
            inner.connector.clone(),
            &inner.config,
            inner.sink.clone(),
        ));
        connection.wait_ready().await?;

        let patterns = inner.notifier.patterns().await;
        if let Some(subscriber) = connection.subscriber().await? {
            for pattern in patterns.iter() {
                subscriber.psubscribe(pattern).await.map_err(unavailable_or_store)?;
            }
        }
        inner.connection.store(connection);
        info!(transport = %inner.id, patterns = patterns.len(), "connection refreshed");
        Ok(())
    }

    /// Watchers currently registered through [`Transport::updated`].
    pub fn watcher_count(&self) -> usize {
        self.inner.notifier.watcher_count()
    }

    fn current(&self) -> Arc<Connection> {
        self.inner.connection.load_full()
    }

    async fn get_record(
        &self,
        entity: &EntityRef,
    ) -> Result<Record> {
        let (id, band) = entity.require_band()?;
        let channel = self.inner.scheme.channel(Some(id), Some(band));

        let client = self.current().primary().await?;
        let value = match client.get(&channel).await.map_err(unavailable_or_store)? {
            Some(bytes) => self.inner.codec.unpack(&bytes, id, band)?,
            None => None,
        };

        Ok(Record {
            id: id.to_string(),
            band: band.to_string(),
            value: value.map_or(Payload::Missing, Payload::Present),
        })
    }

    async fn put_record(
        &self,
        entity: &EntityRef,
        mut value: Document,
        options: PutOptions,
    ) -> Result<Record> {
        let inner = &self.inner;
        let (id, band) = entity.require_band()?;

        if inner.config.write.add_timestamp {
            stamp(&mut value, inner.clock.now());
        }
        let channel = inner.scheme.channel(Some(id), Some(band));
        let packed = inner.codec.pack(&value, id, band)?;

        let connection = self.current();
        let client = connection.primary().await?;

        let check = options
            .check_timestamp
            .unwrap_or(inner.config.write.check_timestamp);
        if check {
            self.check_not_stale(client.get(&channel).await, &channel, id, band, &value)?;
        }

        client
            .set(&channel, &packed)
            .await
            .map_err(unavailable_or_store)?;
        if inner.config.verbose {
            info!(transport = %inner.id, %channel, bytes = packed.len(), "value written");
        }

        match connection.publisher().await {
            Ok(Some(publisher)) => {
                if let Err(e) = publisher.publish(&channel, &[]).await {
                    warn!(transport = %inner.id, %channel, error = %e, "change notice not published");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(transport = %inner.id, %channel, error = %e, "publish link unavailable"),
        }

        Ok(Record {
            id: id.to_string(),
            band: band.to_string(),
            value: Payload::Present(compact(&value)),
        })
    }

    // A failed read or an unreadable stored value does not block the write.
    fn check_not_stale(
        &self,
        stored: std::result::Result<Option<Vec<u8>>, StoreError>,
        channel: &str,
        id: &str,
        band: &str,
        attempted: &Document,
    ) -> Result<()> {
        let bytes = match stored {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(transport = %self.inner.id, %channel, error = %e, "timestamp check read failed, writing anyway");
                return Ok(());
            }
        };

        let stored = match self.inner.codec.unpack(&bytes, id, band) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(transport = %self.inner.id, %channel, error = %e, "stored value unreadable, writing anyway");
                return Ok(());
            }
        };

        if write_allowed(stored.as_ref(), attempted) {
            return Ok(());
        }

        STALE_WRITES.inc();
        let err = Error::StaleWrite {
            channel: channel.to_string(),
            stored: stored
                .as_ref()
                .and_then(timestamp_of)
                .map(str::to_string),
            attempted: timestamp_of(attempted).map(str::to_string),
        };
        debug!(transport = %self.inner.id, error = %err, "write rejected");
        Err(err)
    }

    async fn subscribe(
        &self,
        filter: UpdateFilter,
    ) -> Result<Updates> {
        let inner = &self.inner;
        if filter.id.as_deref() == Some("") || filter.band.as_deref() == Some("") {
            return Err(Error::InvalidRequest("empty update filter segment".into()));
        }
        if !inner.config.notify.enabled {
            return Ok(Updates::closed());
        }

        let pattern = inner
            .scheme
            .subscribe_pattern(filter.id.as_deref(), filter.band.as_deref());
        // Register first so nothing published after the PSUBSCRIBE is missed
        let (receiver, guard) = inner.notifier.register(pattern.clone(), filter);

        let mut patterns = inner.notifier.patterns().await;
        if !patterns.contains(&pattern) {
            let connection = self.current();
            let Some(subscriber) = connection.subscriber().await? else {
                return Ok(Updates::closed());
            };
            subscriber
                .psubscribe(&pattern)
                .await
                .map_err(unavailable_or_store)?;
            debug!(transport = %inner.id, %pattern, "pattern subscribed");
            patterns.insert(pattern);
        }
        drop(patterns);

        Ok(Updates::new(receiver, guard))
    }
}

#[async_trait]
impl Transport for StoreTransport {
    fn list(
        &self,
        filter: ListFilter,
    ) -> ListStream {
        let pattern = self.inner.scheme.scan_pattern(filter.id.as_deref());
        entity_stream(self.inner.clone(), pattern, filter.id)
    }

    async fn added(
        &self,
        entity: &EntityRef,
    ) -> Result<()> {
        entity.require_id()?;
        Ok(())
    }

    async fn bands(
        &self,
        id: &str,
    ) -> Result<Vec<String>> {
        let _timer = ScopedTimer::new("bands");
        let result: Result<Vec<String>> = async {
            EntityRef::entity(id).require_id()?;
            let client = self.current().primary().await?;
            collect_bands(
                client.as_ref(),
                self.inner.scheme.as_ref(),
                id,
                self.inner.config.store.scan_count,
            )
            .await
        }
        .await;
        record_outcome("bands", &result);
        result
    }

    async fn get(
        &self,
        entity: &EntityRef,
    ) -> Result<Record> {
        let _timer = ScopedTimer::new("get");
        let result = self.get_record(entity).await;
        record_outcome("get", &result);
        result
    }

    async fn put(
        &self,
        entity: &EntityRef,
        value: Document,
        options: PutOptions,
    ) -> Result<Record> {
        let _timer = ScopedTimer::new("put");
        let result = self.put_record(entity, value, options).await;
        record_outcome("put", &result);
        result
    }

    async fn remove(
        &self,
        _entity: &EntityRef,
    ) -> Result<Record> {
        let result: Result<Record> = Err(Error::NotImplemented { operation: "remove" });
        record_outcome("remove", &result);
        result
    }

    async fn updated(
        &self,
        filter: UpdateFilter,
    ) -> Result<Updates> {
        let result = self.subscribe(filter).await;
        record_outcome("updated", &result);
        result
    }
}

/// Link-level failures make the connection unusable; anything else is a
/// command error.
pub(crate) fn unavailable_or_store(err: StoreError) -> Error {
    match err {
        StoreError::Connect(_)
        | StoreError::Closed
        | StoreError::Timeout(_)
        | StoreError::CommandTimeout(_) => {
            Error::ConnectionUnavailable(err)
        }
        other => Error::Store(other),
    }
}
