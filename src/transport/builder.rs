use std::sync::Arc;

use arc_swap::ArcSwap;
use config::ConfigError;
use tokio::sync::mpsc;
use tracing::debug;

use super::notify::spawn_dispatcher;
use super::notify::Notifier;
use super::StoreTransport;
use super::TransportInner;
use crate::channel::AddressScheme;
use crate::channel::PathScheme;
use crate::codec::Clock;
use crate::codec::JsonCodec;
use crate::codec::SystemClock;
use crate::codec::ValueCodec;
use crate::config::TransportConfig;
use crate::connection::Connection;
use crate::store::RedisConnector;
use crate::store::StoreConnector;
use crate::Error;
use crate::Result;

/// Reference that every address scheme must round-trip. It contains each
/// escaped character so a scheme that mangles them fails here instead of
/// silently misaddressing data.
const PROBE_ID: &str = "probe/$%#.[id]";
const PROBE_BAND: &str = "band.v1";

/// Configurable builder for [`StoreTransport`].
///
/// # Default collaborators
/// - Store: Redis at `store.host:store.port`
/// - Addressing: [`PathScheme`] with `channel.prefix`
/// - Values: [`JsonCodec`]
/// - Clock: [`SystemClock`]
///
/// # Example
/// ```ignore
/// let config = TransportConfig::new()?.validate()?;
/// let transport = StoreTransport::builder(config).build()?;
/// transport.wait_ready().await?;
/// ```
pub struct TransportBuilder {
    config: TransportConfig,
    connector: Option<Arc<dyn StoreConnector>>,
    scheme: Option<Arc<dyn AddressScheme>>,
    codec: Option<Arc<dyn ValueCodec>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TransportBuilder {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            connector: None,
            scheme: None,
            codec: None,
            clock: None,
        }
    }

    /// Store to connect to instead of the configured Redis endpoint
    pub fn connector(
        mut self,
        connector: impl StoreConnector,
    ) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    pub fn address_scheme(
        mut self,
        scheme: impl AddressScheme,
    ) -> Self {
        self.scheme = Some(Arc::new(scheme));
        self
    }

    pub fn codec(
        mut self,
        codec: impl ValueCodec,
    ) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn clock(
        mut self,
        clock: impl Clock,
    ) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Validates the configuration and starts connecting.
    ///
    /// Returns before the connection is ready; operations wait for it. Must
    /// be called from within a tokio runtime.
    pub fn build(self) -> Result<StoreTransport> {
        let config = self.config.validate()?;

        let scheme = self
            .scheme
            .unwrap_or_else(|| {
                Arc::new(PathScheme::new(config.channel.prefix.clone())) as Arc<dyn AddressScheme>
            });
        verify_round_trip(scheme.as_ref())?;

        let connector = self
            .connector
            .unwrap_or_else(|| {
                Arc::new(RedisConnector::new(&config.store)) as Arc<dyn StoreConnector>
            });
        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(JsonCodec) as Arc<dyn ValueCodec>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let id = nanoid::nanoid!(8);
        let notifier = Arc::new(Notifier::new(
            config.notify.watcher_buffer_size,
            config.verbose,
        ));
        let (sink, messages) = mpsc::unbounded_channel();
        let dispatcher = spawn_dispatcher(notifier.clone(), scheme.clone(), messages);
        let connection = Connection::open(&id, connector.clone(), &config, sink.clone());

        debug!(transport = %id, host = %config.store.host, port = config.store.port, "transport built");

        Ok(StoreTransport::from_inner(TransportInner {
            id,
            config,
            scheme,
            codec,
            clock,
            connector,
            connection: ArcSwap::from_pointee(connection),
            notifier,
            sink,
            dispatcher,
        }))
    }
}

fn verify_round_trip(scheme: &dyn AddressScheme) -> Result<()> {
    let channel = scheme.channel(Some(PROBE_ID), Some(PROBE_BAND));
    match scheme.unchannel(&channel) {
        Some((id, band)) if id == PROBE_ID && band == PROBE_BAND => Ok(()),
        other => Err(Error::Config(ConfigError::Message(format!(
            "address scheme does not round-trip: ({PROBE_ID:?}, {PROBE_BAND:?}) -> {channel:?} -> {other:?}"
        )))),
    }
}
