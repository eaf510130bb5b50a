use tcpx_core::{ConfigError, ConnId, TelemetryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("reactor used before init")]
    NotInitialized,
    #[error("reactor already started")]
    AlreadyStarted,
    #[error("reactor is not running")]
    NotRunning,
    #[error("failed to build shard runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to spawn shard thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("shard {0} is closed")]
    ShardClosed(usize),
    #[error("connection {0} is closed or already serviced")]
    Unavailable(ConnId),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address `{0}`")]
    InvalidAddress(String),
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("reactor initialisation failed: {0}")]
    Reactor(#[from] ReactorError),
    #[error("failed to spawn dispatch path: {0}")]
    Dispatcher(#[source] std::io::Error),
    #[error("failed to install log sink: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("server has been shut down")]
    ShutDown,
    #[error("listener is no longer available")]
    ListenerUnavailable,
}
