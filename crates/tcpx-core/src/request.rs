use crate::codec::Frame;
use crate::connection::{ConnId, Connection};
use crate::error::ConnectionError;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

/// Message-type identifier carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u32);

impl From<u32> for MessageId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded unit of work travelling from a reactor shard to the dispatch path.
///
/// The originating connection is held weakly: a request never keeps a closed
/// connection alive, it only remembers where a reply should go.
#[derive(Debug, Clone)]
pub struct Request {
    msg_id: MessageId,
    payload: Bytes,
    conn_id: ConnId,
    peer: SocketAddr,
    connection: Weak<Connection>,
}

impl Request {
    pub fn new(frame: Frame, connection: &Arc<Connection>) -> Self {
        Self {
            msg_id: frame.msg_id,
            payload: frame.payload,
            conn_id: connection.id(),
            peer: connection.peer_addr(),
            connection: Arc::downgrade(connection),
        }
    }

    pub fn msg_id(&self) -> MessageId {
        self.msg_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn connection_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// The originating connection, if it is still open.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade().filter(|c| !c.is_closed())
    }

    /// Sends a frame back on the originating connection.
    pub fn reply(&self, msg_id: impl Into<MessageId>, payload: &[u8]) -> Result<(), ConnectionError> {
        match self.connection() {
            Some(conn) => conn.send(msg_id, payload),
            None => Err(ConnectionError::Closed(self.conn_id)),
        }
    }
}
