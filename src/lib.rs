//! # tcpx
//!
//! Raw TCP server framework: a socket2-backed listener, a pool of event-loop
//! shards decoding length-prefixed frames, and a single ordered dispatch path
//! running handlers registered by message id.
//!
//! ```ignore
//! use std::sync::Arc;
//! use tcpx::{HandlerError, Request, Server};
//!
//! let server = Arc::new(Server::bind("127.0.0.1:9000")?);
//! server.add_router(1, |req: &Request| -> Result<(), HandlerError> {
//!     req.reply(1, req.payload())?;
//!     Ok(())
//! });
//! server.start_blocking()?;
//! ```

pub use tcpx_codec::{packer, DataPacker};
pub use tcpx_core::{
    codec, config, request_queue, telemetry, CodecError, ConfigError, ConnId, Connection, ConnectionError, ConnectionRegistry, DEFAULT_OUTBOUND_FRAMES,
    DispatchError, Frame, FrameCodec, Handler, HandlerError, Lifecycle, LifecycleState, LogOutput, MessageId, QueueClosed,
    Request, RequestReceiver, RequestSender, RouterTable, ServerBuilder, ServerConfig, TelemetryError,
};
pub use tcpx_transport::{
    DispatchStats, EventLoopPool, Listener, Reactor, ReactorError, Server, ServerError, TcpAcceptor,
};
