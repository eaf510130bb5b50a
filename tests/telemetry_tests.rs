//! # Telemetry Tests: log sink installed at construction
//!
//! Kept in its own test binary: the global subscriber can only be installed
//! once per process.

use std::sync::Arc;
use tcpx::{LogOutput, Server, ServerBuilder};

/// Verifies that a file log destination receives the server's events, and that
/// a second server finding a subscriber already installed still constructs.
#[test]
fn test_file_log_output_receives_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tcpx.log");

    let builder = ServerBuilder::new()
        .with_event_loops(1)
        .with_log_output(LogOutput::File(path.clone()));
    let server = Arc::new(Server::from_builder(builder, "127.0.0.1:0").unwrap());
    server.stop();

    let logged = std::fs::read_to_string(&path).unwrap();
    assert!(logged.contains("server stopped"), "log file was: {logged}");
    assert!(logged.contains("INFO"));

    let again = ServerBuilder::new()
        .with_event_loops(1)
        .with_log_output(LogOutput::Stderr);
    let second = Server::from_builder(again, "127.0.0.1:0");
    assert!(second.is_ok(), "an installed subscriber must not abort construction");
}
