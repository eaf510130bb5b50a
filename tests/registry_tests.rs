//! # Core Layer Tests: ConnectionRegistry, Connection
//!
//! Validates atomic add/count, concurrent admission, bulk clear with sealing,
//! and idempotent connection close.

mod common;

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tcpx::{Connection, ConnectionError, ConnectionRegistry, DataPacker};

/// Verifies that `add` reports the count including the new entry.
#[test]
fn test_registry_add_returns_total() {
    let registry = ConnectionRegistry::new();
    let (a, _ca) = common::connection();
    let (b, _cb) = common::connection();

    assert_eq!(registry.add(Arc::clone(&a)), Some(1));
    assert_eq!(registry.add(Arc::clone(&b)), Some(2));
    assert_eq!(registry.count(), 2);
    assert!(registry.get(a.id()).is_some());

    let mut ids = registry.ids();
    ids.sort();
    assert_eq!(ids, vec![a.id(), b.id()]);

    assert!(registry.remove(a.id()).is_some());
    assert!(registry.remove(a.id()).is_none(), "second remove must be a no-op");
    assert_eq!(registry.count(), 1);
}

/// Verifies that concurrent admission from many threads yields an
/// order-independent final count.
#[test]
fn test_registry_concurrent_add() {
    let t = Instant::now();

    let registry = Arc::new(ConnectionRegistry::new());
    let mut keep_alive = Vec::new();
    let mut conns = Vec::new();
    for _ in 0..16 {
        let (conn, client) = common::connection();
        conns.push(conn);
        keep_alive.push(client);
    }

    let handles: Vec<_> = conns
        .into_iter()
        .map(|conn| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.add(conn).unwrap())
        })
        .collect();
    let mut totals: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    totals.sort_unstable();

    assert_eq!(registry.count(), 16);
    assert_eq!(totals, (1..=16).collect::<Vec<_>>(), "each add must observe a distinct total");

    println!("test_registry_concurrent_add: Testing Overhead = {:?}", t.elapsed());
}

/// Verifies that a connection closed before insertion is never tracked.
#[test]
fn test_registry_skips_closed_connection() {
    let registry = ConnectionRegistry::new();
    let (live, _cl) = common::connection();
    assert_eq!(registry.add(live), Some(1));

    let (conn, _client) = common::connection();
    conn.close();

    assert_eq!(registry.add(Arc::clone(&conn)), None, "a closed connection is not admitted");
    assert_eq!(registry.count(), 1);
    assert!(registry.get(conn.id()).is_none());
}

/// Verifies that `clear_all` closes every connection, empties the registry,
/// and refuses later admissions.
#[test]
fn test_registry_clear_all_seals() {
    let registry = ConnectionRegistry::new();
    let (a, mut client_a) = common::connection();
    let (b, _cb) = common::connection();
    registry.add(Arc::clone(&a));
    registry.add(Arc::clone(&b));

    assert_eq!(registry.clear_all(), 2);
    assert!(registry.is_empty());
    assert!(registry.is_sealed());
    assert!(a.is_closed() && b.is_closed());

    // The unserviced socket is dropped on close, so the peer sees EOF.
    client_a.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut byte = [0u8; 1];
    assert_eq!(client_a.read(&mut byte).unwrap(), 0);

    let (late, _cl) = common::connection();
    assert_eq!(registry.add(Arc::clone(&late)), None);
    assert!(late.is_closed(), "admission after clear_all must close the connection");
    assert!(registry.is_empty());
}

/// Verifies close idempotency and that a closed connection refuses sends.
#[test]
fn test_connection_close_is_idempotent() {
    let (conn, _client) = common::connection();

    assert!(conn.close(), "first close closes");
    assert!(!conn.close(), "second close is a no-op");
    assert!(conn.take_io().is_none());
    assert!(matches!(conn.send(1, b"x"), Err(ConnectionError::Closed(id)) if id == conn.id()));
}

/// Verifies that connection ids are unique and increasing.
#[test]
fn test_connection_ids_are_monotonic() {
    let (a, _ca) = common::connection();
    let (b, _cb) = common::connection();
    assert!(b.id() > a.id());
    assert_ne!(a.id().to_string(), b.id().to_string());
}

/// Verifies that a connection whose outbound queue fills up is closed instead
/// of buffering replies without bound.
#[test]
fn test_connection_outbound_backlog_closes() {
    let (server_side, _client, peer) = common::socket_pair();
    let conn = Connection::with_outbound_capacity(server_side, peer, Arc::new(DataPacker::default()), 2);

    conn.send(1, b"a").unwrap();
    conn.send(1, b"b").unwrap();
    assert!(matches!(conn.send(1, b"c"), Err(ConnectionError::Backlogged(id)) if id == conn.id()));
    assert!(conn.is_closed());
    assert!(matches!(conn.send(1, b"d"), Err(ConnectionError::Closed(_))));
}
