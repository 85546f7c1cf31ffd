use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Channel addressing: every stored key starts with `prefix`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<()> {
        // Glob metacharacters in the prefix would widen every scan and
        // subscribe pattern built from it.
        if self.prefix.contains(['*', '?', '[', ']', '\\']) {
            return Err(Error::Config(ConfigError::Message(format!(
                "channel.prefix {:?} contains glob metacharacters",
                self.prefix
            ))));
        }
        Ok(())
    }
}

fn default_prefix() -> String {
    "/".to_string()
}
