use futures::future::BoxFuture;
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tcpx_core::{Connection, FrameCodec, ServerConfig};

/// Source of accepted client connections.
pub trait Listener: Send + 'static {
    fn local_addr(&self) -> SocketAddr;

    /// Waits for the next client. Must be cancel-safe: the accept loop drops the
    /// future when shutdown is requested.
    fn accept<'a>(&'a mut self, codec: &'a Arc<dyn FrameCodec>) -> BoxFuture<'a, io::Result<Arc<Connection>>>;
}

/// TCP listener bound through socket2.
///
/// Binding happens eagerly on the constructing thread; registration with a
/// tokio reactor is deferred to the first `accept`, which runs inside the
/// runtime driving the accept loop.
pub struct TcpAcceptor {
    pending: Option<std::net::TcpListener>,
    listener: Option<tokio::net::TcpListener>,
    local_addr: SocketAddr,
    keepalive: Option<Duration>,
    nodelay: bool,
    outbound_frames: usize,
}

impl TcpAcceptor {
    pub fn bind(addr: SocketAddr, config: &ServerConfig) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(config.backlog)?;

        let std_listener: std::net::TcpListener = socket.into();
        let local_addr = std_listener.local_addr()?;

        Ok(Self {
            pending: Some(std_listener),
            listener: None,
            local_addr,
            keepalive: config.tcp_keepalive(),
            nodelay: config.tcp_nodelay,
            outbound_frames: config.outbound_frames,
        })
    }

    fn registered(&mut self) -> io::Result<&tokio::net::TcpListener> {
        if self.listener.is_none() {
            let pending = self
                .pending
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener already released"))?;
            self.listener = Some(tokio::net::TcpListener::from_std(pending)?);
        }
        self.listener
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener already released"))
    }

    fn tune(&self, stream: &std::net::TcpStream) {
        let sock = SockRef::from(stream);
        if let Err(e) = sock.set_nodelay(self.nodelay) {
            tracing::warn!(error = %e, "failed to set TCP_NODELAY");
        }
        if let Some(idle) = self.keepalive {
            if let Err(e) = sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle)) {
                tracing::warn!(error = %e, "failed to enable TCP keep-alive");
            }
        }
    }
}

impl Listener for TcpAcceptor {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn accept<'a>(&'a mut self, codec: &'a Arc<dyn FrameCodec>) -> BoxFuture<'a, io::Result<Arc<Connection>>> {
        Box::pin(async move {
            let (stream, peer) = self.registered()?.accept().await?;
            // Shards run their own runtimes; hand the socket over unregistered.
            let stream = stream.into_std()?;
            self.tune(&stream);
            Ok(Arc::new(Connection::with_outbound_capacity(
                stream,
                peer,
                Arc::clone(codec),
                self.outbound_frames,
            )))
        })
    }
}
