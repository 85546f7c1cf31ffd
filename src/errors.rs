//! Transport error hierarchy
//!
//! Every public operation completes with either a value or one of these
//! errors. Nothing is retried internally; retry policy belongs to the caller.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection never became usable (unreachable store, AUTH or SELECT
    /// rejected) or a link was closed underneath us.
    #[error("Store unavailable: {0}")]
    ConnectionUnavailable(#[source] StoreError),

    /// The optimistic concurrency check found a value that is not older than
    /// the one being written. Nothing was written.
    #[error("Stale write rejected on {channel}: stored {stored:?}, attempted {attempted:?}")]
    StaleWrite {
        channel: String,
        stored: Option<String>,
        attempted: Option<String>,
    },

    /// The operation is part of the transport contract but unsupported here.
    #[error("{operation} is not implemented by this transport")]
    NotImplemented { operation: &'static str },

    /// A pub/sub topic that does not decode into an entity reference.
    /// Never surfaced to callers; such events are dropped.
    #[error("Malformed topic: {0}")]
    MalformedTopic(String),

    /// A prefix scan failed part way. Entries already yielded stay valid.
    #[error("Scan failed: {0}")]
    ScanFailure(#[source] StoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures reported by the underlying store client.
///
/// Kept `Clone` so a terminal failure can be stored in the readiness state and
/// handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("SELECT {db} failed: {message}")]
    Select { db: i64, message: String },

    #[error("{command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },

    /// Connect timeout, in milliseconds.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// A command got no reply within the client's response timeout.
    #[error("Command timed out: {0}")]
    CommandTimeout(String),

    #[error("Link closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to serialize value: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to deserialize value: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// Stored payload decoded, but not into a mapping.
    #[error("Stored value is not a mapping")]
    NotAMapping,
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            return StoreError::CommandTimeout(err.to_string());
        }
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            return StoreError::Connect(err.to_string());
        }
        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => StoreError::Auth(err.to_string()),
            _ => StoreError::Command {
                command: err.code().map(static_code).unwrap_or("command"),
                message: err.to_string(),
            },
        }
    }
}

// Server error codes we care to name; anything else is reported generically.
fn static_code(code: &str) -> &'static str {
    match code {
        "NOAUTH" => "NOAUTH",
        "WRONGPASS" => "WRONGPASS",
        "WRONGTYPE" => "WRONGTYPE",
        "READONLY" => "READONLY",
        "LOADING" => "LOADING",
        _ => "command",
    }
}

impl Error {
    /// True for failures that invalidate the whole connection instance.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::ConnectionUnavailable(_))
    }

    pub fn is_stale_write(&self) -> bool {
        matches!(self, Error::StaleWrite { .. })
    }
}
