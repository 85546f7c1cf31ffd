use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Change notification over store pub/sub
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct NotifyConfig {
    /// Open the publish and subscribe links. When off, publishing after a
    /// write is skipped and `updated` yields nothing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-watcher queue depth. Notices beyond it are dropped for that
    /// watcher only.
    #[serde(default = "default_watcher_buffer_size")]
    pub watcher_buffer_size: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            watcher_buffer_size: default_watcher_buffer_size(),
        }
    }
}

impl NotifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.watcher_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "notify.watcher_buffer_size must be at least 1".into(),
            )));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}
fn default_watcher_buffer_size() -> usize {
    64
}
