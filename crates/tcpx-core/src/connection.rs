use crate::codec::FrameCodec;
use crate::error::ConnectionError;
use crate::request::MessageId;
use bytes::Bytes;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Reply frames a connection may have queued before it is considered stuck.
pub const DEFAULT_OUTBOUND_FRAMES: usize = 1024;

/// Process-unique, monotonically assigned connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Socket and outbound queue, handed to a reactor shard exactly once.
pub struct ConnectionIo {
    pub stream: TcpStream,
    pub outbound: mpsc::Receiver<Bytes>,
}

/// Handle to one accepted client.
///
/// Shared between the connection registry (enumeration, bulk close) and the
/// reactor shard doing its I/O. The socket itself is owned by whoever took
/// [`ConnectionIo`]; everyone else talks to it through `send` and `close`.
pub struct Connection {
    id: ConnId,
    peer: SocketAddr,
    connected_at: Instant,
    codec: Arc<dyn FrameCodec>,
    io: Mutex<Option<ConnectionIo>>,
    outbound: mpsc::Sender<Bytes>,
    closed: watch::Sender<bool>,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, codec: Arc<dyn FrameCodec>) -> Self {
        Self::with_outbound_capacity(stream, peer, codec, DEFAULT_OUTBOUND_FRAMES)
    }

    /// Like [`Connection::new`], with at most `frames` replies queued for writing.
    pub fn with_outbound_capacity(
        stream: TcpStream,
        peer: SocketAddr,
        codec: Arc<dyn FrameCodec>,
        frames: usize,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(frames.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            id: ConnId::next(),
            peer,
            connected_at: Instant::now(),
            codec,
            io: Mutex::new(Some(ConnectionIo {
                stream,
                outbound: outbound_rx,
            })),
            outbound,
            closed,
            permit: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn codec(&self) -> &Arc<dyn FrameCodec> {
        &self.codec
    }

    /// Ties an admission permit to this connection; released on close.
    pub fn hold_permit(&self, permit: OwnedSemaphorePermit) {
        if let Ok(mut slot) = self.permit.lock() {
            *slot = Some(permit);
        }
    }

    /// Takes the socket for servicing. Returns `None` once taken or after close.
    pub fn take_io(&self) -> Option<ConnectionIo> {
        if self.is_closed() {
            return None;
        }
        self.io.lock().ok()?.take()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the connection has been closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Closes the connection. Idempotent; returns `true` for the call that closed it.
    ///
    /// A socket that was never handed to a shard is dropped here. A serviced socket
    /// is dropped by its shard once it observes the close signal.
    pub fn close(&self) -> bool {
        if self.closed.send_replace(true) {
            return false;
        }
        if let Ok(mut io) = self.io.lock() {
            io.take();
        }
        if let Ok(mut permit) = self.permit.lock() {
            permit.take();
        }
        true
    }

    /// Encodes a frame with this connection's codec and queues it for writing.
    ///
    /// Never waits. A peer that stops reading until the outbound queue fills is
    /// closed, and the frame is refused with [`ConnectionError::Backlogged`].
    pub fn send(&self, msg_id: impl Into<MessageId>, payload: &[u8]) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.id));
        }
        let frame = self.codec.pack(msg_id.into(), payload)?;
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.id, peer = %self.peer, "outbound queue full, closing connection");
                self.close();
                Err(ConnectionError::Backlogged(self.id))
            }
            Err(TrySendError::Closed(_)) => Err(ConnectionError::Closed(self.id)),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
