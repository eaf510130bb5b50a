#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tcpx::{Connection, DataPacker, FrameCodec, MessageId};

/// A connected loopback pair: (server side, client side, client address).
pub fn socket_pair() -> (TcpStream, TcpStream, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server_side, peer) = listener.accept().unwrap();
    (server_side, client, peer)
}

/// A fresh, unserviced connection using the default codec.
pub fn connection() -> (Arc<Connection>, TcpStream) {
    let (server_side, client, peer) = socket_pair();
    let conn = Arc::new(Connection::new(server_side, peer, Arc::new(DataPacker::default())));
    (conn, client)
}

pub fn frame(msg_id: u32, payload: &[u8]) -> Vec<u8> {
    DataPacker::default()
        .pack(MessageId(msg_id), payload)
        .unwrap()
        .to_vec()
}

/// Polls `cond` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
