use serde::Deserialize;
use serde::Serialize;

/// Write path behaviour
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct WriteConfig {
    /// Merge the current time into values that do not carry a timestamp
    #[serde(default = "default_true")]
    pub add_timestamp: bool,

    /// Reject writes whose timestamp is not newer than the stored one.
    /// Individual `put` calls may override this.
    #[serde(default = "default_true")]
    pub check_timestamp: bool,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            add_timestamp: true,
            check_timestamp: true,
        }
    }
}

fn default_true() -> bool {
    true
}
