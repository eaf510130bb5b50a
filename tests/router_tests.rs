//! # Core Layer Tests: RouterTable
//!
//! Validates last-write-wins registration, resolution failures, and that
//! handler failures and panics come back as values.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tcpx::{DispatchError, Frame, HandlerError, MessageId, Request, RouterTable};

fn request(msg_id: u32, payload: &'static [u8]) -> (Request, Arc<tcpx::Connection>, std::net::TcpStream) {
    let (conn, client) = common::connection();
    let request = Request::new(Frame::new(msg_id, payload), &conn);
    (request, conn, client)
}

/// Verifies that a later registration replaces an earlier one.
#[test]
fn test_router_last_write_wins() {
    let router = RouterTable::new();
    let hits = Arc::new(AtomicUsize::new(0));

    router.add(1, |_: &Request| -> Result<(), HandlerError> { Err("stale handler".into()) });
    let counter = Arc::clone(&hits);
    router.add(1, move |_: &Request| -> Result<(), HandlerError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let (req, _conn, _client) = request(1, b"ping");
    router.dispatch(&req).expect("replacement handler should run");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(router.len(), 1);
}

/// Verifies that an unregistered id yields `NoHandler`.
#[test]
fn test_router_missing_handler() {
    let router = RouterTable::new();
    let (req, _conn, _client) = request(42, b"");

    assert!(matches!(router.dispatch(&req), Err(DispatchError::NoHandler(MessageId(42)))));
    assert!(router.is_empty());
}

/// Verifies that a handler's own error is propagated with its message id.
#[test]
fn test_router_propagates_handler_error() {
    let router = RouterTable::new();
    router.add(3, |_: &Request| -> Result<(), HandlerError> { Err("bad payload".into()) });
    let (req, _conn, _client) = request(3, b"?");

    match router.dispatch(&req) {
        Err(DispatchError::Handler { msg_id, source }) => {
            assert_eq!(msg_id, MessageId(3));
            assert_eq!(source.to_string(), "bad payload");
        }
        other => panic!("expected handler error, got {:?}", other),
    }
}

/// Verifies that a panicking handler does not unwind through dispatch.
#[test]
fn test_router_contains_panics() {
    let router = RouterTable::new();
    router.add(9, |_: &Request| -> Result<(), HandlerError> { panic!("handler bug") });
    let (req, _conn, _client) = request(9, b"");

    assert!(matches!(router.dispatch(&req), Err(DispatchError::HandlerPanicked(MessageId(9)))));
    assert!(router.contains(9u32), "a panic must not unregister the handler");
}

/// Verifies that handlers see the decoded payload and originating connection.
#[test]
fn test_router_request_context() {
    let router = RouterTable::new();
    let (req, conn, _client) = request(5, b"payload");
    let expected = conn.id();

    router.add(5, move |r: &Request| -> Result<(), HandlerError> {
        assert_eq!(&r.payload()[..], b"payload");
        assert_eq!(r.connection_id(), expected);
        assert!(r.connection().is_some());
        Ok(())
    });
    router.dispatch(&req).unwrap();

    conn.close();
    assert!(req.connection().is_none(), "closed connection must not be handed out");
    assert!(req.reply(5, b"late").is_err());
}

/// Verifies that registration while another thread dispatches is safe.
#[test]
fn test_router_concurrent_registration() {
    let router = Arc::new(RouterTable::new());
    router.add(0, |_: &Request| -> Result<(), HandlerError> { Ok(()) });

    let writer = {
        let router = Arc::clone(&router);
        std::thread::spawn(move || {
            for id in 1..200u32 {
                router.add(id, |_: &Request| -> Result<(), HandlerError> { Ok(()) });
            }
        })
    };

    let (req, _conn, _client) = request(0, b"");
    for _ in 0..1000 {
        router.dispatch(&req).unwrap();
    }
    writer.join().unwrap();
    assert_eq!(router.len(), 200);
}
