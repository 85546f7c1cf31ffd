//! Configuration for a transport instance.
//!
//! Resolved once into an immutable [`TransportConfig`]. Sources, later ones
//! overriding earlier ones:
//! 1. Built-in defaults
//! 2. File named by `CONFIG_PATH`
//! 3. Explicit override file (`with_override_config`)
//! 4. Environment variables `TRANSPORT__<SECTION>__<KEY>`

mod channel;
mod notify;
mod store;
mod write;
pub use channel::*;
pub use notify::*;
pub use store::*;
pub use write::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "TRANSPORT";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TransportConfig {
    /// Store endpoint, credentials and database selection
    #[serde(default)]
    pub store: StoreConfig,

    /// Channel (storage key) addressing
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Timestamp stamping and optimistic concurrency
    #[serde(default)]
    pub write: WriteConfig,

    /// Publish/subscribe change notification
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Per-operation diagnostic logging at info level
    #[serde(default)]
    pub verbose: bool,
}

impl TransportConfig {
    /// Builds the configuration from defaults, the optional `CONFIG_PATH`
    /// file, and `TRANSPORT__*` environment variables.
    ///
    /// No validation happens here; call [`validate`](Self::validate) once all
    /// overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("TRANSPORT__STORE__HOST", "10.0.0.7");
    /// let cfg = TransportConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Layers another file over the current values. Environment variables are
    /// re-applied on top so they keep the highest priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the frozen configuration.
    pub fn validate(self) -> Result<Self> {
        self.store.validate()?;
        self.channel.validate()?;
        self.notify.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
