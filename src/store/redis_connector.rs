use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::aio::PubSubSink;
use redis::ConnectionAddr;
use redis::ConnectionInfo;
use redis::RedisConnectionInfo;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;

use super::StoreClient;
use super::StoreConnector;
use super::StoreMessage;
use super::StoreResult;
use super::StoreSubscriber;
use crate::config::StoreConfig;
use crate::StoreError;

/// Opens links to a Redis server with the `redis` crate.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    host: String,
    port: u16,
    password: Option<String>,
    connect_timeout: Duration,
}

impl RedisConnector {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
            connect_timeout: config.connect_timeout(),
        }
    }

    fn client(
        &self,
        password: Option<String>,
    ) -> StoreResult<redis::Client> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                password,
                ..Default::default()
            },
        };
        redis::Client::open(info).map_err(|e| StoreError::Connect(e.to_string()))
    }

    async fn with_timeout<T, F>(
        &self,
        connect: F,
    ) -> StoreResult<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.connect_timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn open_client(&self) -> StoreResult<Arc<dyn StoreClient>> {
        // AUTH and SELECT are issued explicitly by the connection
        let client = self.client(None)?;
        let conn = self
            .with_timeout(client.get_multiplexed_async_connection())
            .await?;
        debug!(host = %self.host, port = self.port, "command link connected");
        Ok(Arc::new(RedisClient { conn }))
    }

    async fn open_subscriber(
        &self,
        sink: mpsc::UnboundedSender<StoreMessage>,
    ) -> StoreResult<Arc<dyn StoreSubscriber>> {
        let client = self.client(self.password.clone())?;
        let pubsub = self.with_timeout(client.get_async_pubsub()).await?;
        let (pubsub_sink, mut stream) = pubsub.split();

        let forward = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let message = StoreMessage {
                    pattern: msg.get_pattern::<String>().ok(),
                    channel: msg.get_channel_name().to_string(),
                    payload: msg.get_payload_bytes().to_vec(),
                };
                if sink.send(message).is_err() {
                    trace!("subscriber sink closed, stop forwarding");
                    break;
                }
            }
            debug!("subscribe link stream ended");
        });

        debug!(host = %self.host, port = self.port, "subscribe link connected");
        Ok(Arc::new(RedisSubscriber {
            sink: pubsub_sink,
            forward,
        }))
    }
}

struct RedisClient {
    conn: MultiplexedConnection,
}

#[async_trait]
impl StoreClient for RedisClient {
    async fn auth(
        &self,
        password: &str,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("AUTH")
            .arg(password)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Auth(e.to_string()))?;
        Ok(())
    }

    async fn select(
        &self,
        db: i64,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SELECT")
            .arg(db)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Select {
                db,
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET").arg(key).arg(value).query_async(&mut conn).await?;
        Ok(())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        let mut conn = self.conn.clone();
        let page: (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok(page)
    }

    async fn publish(
        &self,
        channel: &str,
        payload: &[u8],
    ) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }
}

struct RedisSubscriber {
    sink: PubSubSink,
    forward: JoinHandle<()>,
}

#[async_trait]
impl StoreSubscriber for RedisSubscriber {
    async fn psubscribe(
        &self,
        pattern: &str,
    ) -> StoreResult<()> {
        let mut sink = self.sink.clone();
        sink.psubscribe(pattern).await?;
        Ok(())
    }
}

impl Drop for RedisSubscriber {
    fn drop(&mut self) {
        self.forward.abort();
    }
}
