use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_DB_INDEX;
use crate::Error;
use crate::Result;

/// Where the store lives and how a fresh link is prepared for use.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Logical database selected after authentication.
    /// `None` or `0` leaves the connection on the server default.
    #[serde(default = "default_db")]
    pub db: Option<i64>,

    /// Credential sent with AUTH before anything else
    #[serde(default, alias = "auth", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Upper bound on establishing a single TCP link
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// COUNT hint passed with every SCAN page
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: default_db(),
            password: None,
            connect_timeout_in_ms: default_connect_timeout(),
            scan_count: default_scan_count(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "store.host cannot be empty".into(),
            )));
        }

        if self.port == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.port must be greater than 0".into(),
            )));
        }

        if let Some(db) = self.db {
            if !(0..=MAX_DB_INDEX).contains(&db) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "store.db {db} out of range 0..={MAX_DB_INDEX}"
                ))));
            }
        }

        if self.connect_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.connect_timeout_in_ms must be at least 1ms".into(),
            )));
        }

        if self.scan_count == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.scan_count must be at least 1".into(),
            )));
        }

        Ok(())
    }

    /// Database to SELECT during initialization, if any.
    pub fn selected_db(&self) -> Option<i64> {
        self.db.filter(|db| *db != 0)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6379
}
fn default_db() -> Option<i64> {
    Some(2)
}
fn default_connect_timeout() -> u64 {
    3000
}
fn default_scan_count() -> usize {
    100
}
