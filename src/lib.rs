//! Key-addressable data transport over a shared Redis connection.
//!
//! Documents are addressed by `(id, band)` and stored one key per pair.
//! The transport offers reads, timestamp-guarded writes, prefix enumeration
//! and pattern-based change notification, all gated on a connection that
//! authenticates and selects its database exactly once.
//!
//! ```ignore
//! use redis_transport::*;
//!
//! let config = TransportConfig::new()?.validate()?;
//! let transport = StoreTransport::builder(config).build()?;
//! let record = transport.get(&EntityRef::new("lamp", "state")).await?;
//! ```

pub mod channel;
pub mod codec;
pub mod config;
mod connection;
mod constants;
mod errors;
pub mod metrics;
mod scoped_timer;
pub mod store;
mod transport;

pub use connection::*;
pub use constants::*;
pub use errors::*;
pub use transport::*;

pub(crate) use scoped_timer::ScopedTimer;

pub use crate::config::TransportConfig;

/// A stored value: a JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
