use crate::connection::ConnId;
use crate::request::MessageId;
use thiserror::Error;

/// Error type handlers report back to the dispatch path.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("malformed frame: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection {0} is closed")]
    Closed(ConnId),
    #[error("outbound queue of connection {0} is full")]
    Backlogged(ConnId),
    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler registered for message {0}")]
    NoHandler(MessageId),
    #[error("handler for message {msg_id} failed: {source}")]
    Handler {
        msg_id: MessageId,
        #[source]
        source: HandlerError,
    },
    #[error("handler for message {0} panicked")]
    HandlerPanicked(MessageId),
}

/// Producing into the request queue after it was closed.
///
/// Only reachable when shutdown ordering is broken, so callers treat it as an
/// invariant violation rather than a recoverable condition.
#[derive(Debug, Error)]
#[error("request queue is closed")]
pub struct QueueClosed;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown log level `{0}`")]
    Level(String),
    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
}
