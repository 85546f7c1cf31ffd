//! The key/value store as an opaque capability.
//!
//! The transport only needs a handful of commands: AUTH, SELECT, GET, SET,
//! SCAN, PUBLISH and PSUBSCRIBE. They are grouped into two link kinds because
//! a subscribed link cannot issue regular commands.

mod glob;
mod memory;
mod redis_connector;
pub use glob::*;
pub use memory::*;
pub use redis_connector::*;


use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A pattern-matched message delivered on a subscribe link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMessage {
    /// Pattern that matched, `None` for plain channel subscriptions
    pub pattern: Option<String>,
    pub channel: String,
    pub payload: Vec<u8>,
}

/// A regular command link.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    async fn auth(
        &self,
        password: &str,
    ) -> StoreResult<()>;

    async fn select(
        &self,
        db: i64,
    ) -> StoreResult<()>;

    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<Vec<u8>>>;

    async fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> StoreResult<()>;

    /// One SCAN page. A returned cursor of `0` ends the iteration.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)>;

    /// Returns the number of receivers the server reported.
    async fn publish(
        &self,
        channel: &str,
        payload: &[u8],
    ) -> StoreResult<u64>;
}

/// A link in subscribe mode. Messages flow into the sink handed to
/// [`StoreConnector::open_subscriber`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreSubscriber: Send + Sync + 'static {
    async fn psubscribe(
        &self,
        pattern: &str,
    ) -> StoreResult<()>;
}

/// Opens links to one store endpoint.
///
/// Command links start unauthenticated on database 0; preparing them is the
/// caller's job. Subscribe links authenticate while connecting, since they
/// accept no regular commands once subscribed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    async fn open_client(&self) -> StoreResult<Arc<dyn StoreClient>>;

    async fn open_subscriber(
        &self,
        sink: mpsc::UnboundedSender<StoreMessage>,
    ) -> StoreResult<Arc<dyn StoreSubscriber>>;
}
