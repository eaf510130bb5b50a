pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod request;
pub mod router;
pub mod telemetry;

pub use codec::{Frame, FrameCodec};
pub use config::ServerConfig;
pub use connection::{ConnId, Connection, ConnectionIo, DEFAULT_OUTBOUND_FRAMES};
pub use error::{
    CodecError, ConfigError, ConnectionError, DispatchError, HandlerError, QueueClosed, TelemetryError,
};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use queue::{request_queue, RequestReceiver, RequestSender};
pub use registry::ConnectionRegistry;
pub use request::{MessageId, Request};
pub use router::{Handler, RouterTable};
pub use telemetry::LogOutput;

use std::sync::Arc;

/// Collects configuration, routes and codec before a server is bound.
///
/// ## Static Registration
/// Routes are installed here, before any traffic exists, and handed to the
/// server as a ready table.
pub struct ServerBuilder {
    pub config: ServerConfig,
    pub router: RouterTable,
    pub packer: Option<Arc<dyn FrameCodec>>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            router: RouterTable::new(),
            packer: None,
        }
    }

    /// Registers a handler for a message id.
    pub fn route(self, msg_id: u32, handler: impl Handler) -> Self {
        self.router.add(msg_id, handler);
        self
    }

    /// Overrides the default server configuration.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Reactor shard count; zero falls back to CPU parallelism.
    pub fn with_event_loops(mut self, n: usize) -> Self {
        self.config.event_loops = n;
        self
    }

    /// Replaces the built-in frame codec.
    pub fn with_packer(mut self, packer: Arc<dyn FrameCodec>) -> Self {
        self.packer = Some(packer);
        self
    }

    pub fn with_log_output(mut self, output: LogOutput) -> Self {
        self.config.log_output = Some(output);
        self
    }

    pub fn with_tcp_keepalive(mut self, secs: Option<u64>) -> Self {
        self.config.tcp_keepalive_secs = secs;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn with_max_connections(mut self, max: Option<usize>) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn with_dispatch_lanes(mut self, lanes: usize) -> Self {
        self.config.dispatch_lanes = lanes;
        self
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
