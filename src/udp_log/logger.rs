//! Per-worker request logger.
//!
//! # Responsibilities
//! - Turn a completed request into a log record
//! - Keep exactly one emitter per destination descriptor
//! - Swallow every transport error
//!
//! # Design Decisions
//! - One `RequestLogger` per worker; never shared between workers
//! - Emitters are created lazily, the first time a destination is used
//! - Dropping the logger (or `release_all`) closes every socket it owns
//! - An emitter whose descriptor no scope references any more is dropped
//!   before a new one is created

use std::sync::Arc;

use crate::observability::metrics;
use crate::udp_log::destination::Destination;
use crate::udp_log::emitter::{Transport, UdpEmitter, UdpTransport};
use crate::udp_log::record::LogRecord;
use crate::udp_log::scope::LogScope;

/// Owns the emitters of a single worker.
#[derive(Debug)]
pub struct RequestLogger<T: Transport = UdpTransport> {
    transport: T,
    emitters: Vec<UdpEmitter<T>>,
}

impl RequestLogger<UdpTransport> {
    pub fn new() -> Self {
        Self::with_transport(UdpTransport)
    }
}

impl Default for RequestLogger<UdpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport + Clone> RequestLogger<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            emitters: Vec::new(),
        }
    }

    /// Log one completed request. Never fails, never blocks.
    pub fn handle_request_completed(&mut self, scope: &LogScope, method: &str, path: &[u8]) {
        let destination = scope.destination();
        if !destination.is_enabled() {
            return;
        }

        let record = LogRecord::new(method, path);
        let Some(emitter) = self.emitter_for(destination) else {
            return;
        };

        if let Err(e) = emitter.send_record(&record) {
            tracing::debug!(error = %e, "Dropped request log record");
            metrics::record_transport_error(e.kind());
        }
    }

    fn emitter_for(&mut self, destination: &Arc<Destination>) -> Option<&mut UdpEmitter<T>> {
        if let Some(index) = self
            .emitters
            .iter()
            .position(|e| Arc::ptr_eq(e.destination(), destination))
        {
            return self.emitters.get_mut(index);
        }

        self.release_unreferenced();
        let emitter = UdpEmitter::with_transport(Arc::clone(destination), self.transport.clone())?;
        self.emitters.push(emitter);
        self.emitters.last_mut()
    }

    /// Number of emitters created so far.
    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    /// Number of emitters currently holding a socket.
    pub fn connected_count(&self) -> usize {
        self.emitters.iter().filter(|e| e.is_connected()).count()
    }

    /// Drop every emitter, closing their sockets. Returns how many were connected.
    pub fn release_all(&mut self) -> usize {
        let connected = self.connected_count();
        self.emitters.clear();
        connected
    }

    /// Drop emitters whose descriptor is held by nothing but the emitter itself.
    /// Returns how many of them were connected.
    pub fn release_unreferenced(&mut self) -> usize {
        let mut released = 0;
        self.emitters.retain(|e| {
            let referenced = Arc::strong_count(e.destination()) > 1;
            if !referenced && e.is_connected() {
                released += 1;
            }
            referenced
        });
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udp_log::emitter::testing::MockTransport;
    use std::io;

    fn logger() -> (RequestLogger<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        (RequestLogger::with_transport(transport.clone()), transport)
    }

    #[test]
    fn disabled_scope_touches_nothing() {
        let (mut logger, transport) = logger();
        let scope = LogScope::root(Some("off")).unwrap();

        logger.handle_request_completed(&scope, "GET", b"/");
        logger.handle_request_completed(&scope, "POST", b"/submit");

        let calls = transport.calls.borrow();
        assert_eq!(calls.connects, 0);
        assert_eq!(calls.sends, 0);
        assert_eq!(logger.emitter_count(), 0);
    }

    #[test]
    fn unconfigured_scope_touches_nothing() {
        let (mut logger, transport) = logger();
        logger.handle_request_completed(&LogScope::root(None).unwrap(), "GET", b"/");
        assert_eq!(transport.calls.borrow().connects, 0);
    }

    #[test]
    fn emitter_is_reused_across_requests() {
        let (mut logger, transport) = logger();
        let scope = LogScope::root(Some("127.0.0.1:5000")).unwrap();

        logger.handle_request_completed(&scope, "GET", b"/a");
        logger.handle_request_completed(&scope, "GET", b"/b");

        let calls = transport.calls.borrow();
        assert_eq!(calls.connects, 1);
        assert_eq!(calls.sent.len(), 2);
        assert_eq!(calls.sent[0], LogRecord::new("GET", b"/a").to_bytes());
        assert_eq!(logger.emitter_count(), 1);
    }

    #[test]
    fn inherited_scopes_share_one_emitter() {
        let (mut logger, transport) = logger();
        let server = LogScope::root(Some("127.0.0.1:5000")).unwrap();
        let location = server.nested(None).unwrap();

        logger.handle_request_completed(&server, "GET", b"/");
        logger.handle_request_completed(&location, "GET", b"/api");

        assert_eq!(transport.calls.borrow().connects, 1);
        assert_eq!(logger.emitter_count(), 1);
    }

    #[test]
    fn distinct_descriptors_get_distinct_emitters() {
        let (mut logger, transport) = logger();
        let a = LogScope::root(Some("127.0.0.1:5000")).unwrap();
        let b = a.nested(Some("127.0.0.1:5001")).unwrap();

        logger.handle_request_completed(&a, "GET", b"/");
        logger.handle_request_completed(&b, "GET", b"/");

        assert_eq!(transport.calls.borrow().connects, 2);
        assert_eq!(logger.emitter_count(), 2);
    }

    #[test]
    fn send_failure_is_swallowed_and_not_sticky() {
        let (mut logger, transport) = logger();
        transport.fail_next_send(io::ErrorKind::ConnectionRefused);
        let scope = LogScope::root(Some("127.0.0.1:5000")).unwrap();

        logger.handle_request_completed(&scope, "GET", b"/first");
        logger.handle_request_completed(&scope, "GET", b"/second");

        let calls = transport.calls.borrow();
        assert_eq!(calls.sends, 2);
        assert_eq!(calls.sent, vec![LogRecord::new("GET", b"/second").to_bytes()]);
        assert_eq!(calls.connects, 1);
    }

    #[test]
    fn connect_failure_is_swallowed_and_retried() {
        let (mut logger, transport) = logger();
        transport.fail_next_connect(io::ErrorKind::AddrNotAvailable);
        let scope = LogScope::root(Some("127.0.0.1:5000")).unwrap();

        logger.handle_request_completed(&scope, "GET", b"/first");
        assert_eq!(logger.connected_count(), 0);

        logger.handle_request_completed(&scope, "GET", b"/second");
        assert_eq!(logger.connected_count(), 1);

        let calls = transport.calls.borrow();
        assert_eq!(calls.connects, 2);
        assert_eq!(calls.sent.len(), 1);
    }

    #[test]
    fn release_all_closes_sockets() {
        let (mut logger, transport) = logger();
        let scope = LogScope::root(Some("127.0.0.1:5000")).unwrap();
        logger.handle_request_completed(&scope, "GET", b"/");

        assert_eq!(logger.release_all(), 1);
        assert_eq!(logger.emitter_count(), 0);

        // A fresh emitter is created on the next request.
        logger.handle_request_completed(&scope, "GET", b"/");
        assert_eq!(transport.calls.borrow().connects, 2);
    }

    #[test]
    fn emitters_outliving_their_scope_are_released() {
        let (mut logger, _transport) = logger();
        let kept = LogScope::root(Some("127.0.0.1:5000")).unwrap();
        let replaced = LogScope::root(Some("127.0.0.1:5001")).unwrap();

        logger.handle_request_completed(&kept, "GET", b"/");
        logger.handle_request_completed(&replaced, "GET", b"/");
        assert_eq!(logger.release_unreferenced(), 0);

        drop(replaced);
        assert_eq!(logger.release_unreferenced(), 1);
        assert_eq!(logger.emitter_count(), 1);
        assert_eq!(logger.connected_count(), 1);
    }

    #[test]
    fn new_destination_evicts_orphaned_emitter() {
        let (mut logger, _transport) = logger();
        let old = LogScope::root(Some("127.0.0.1:5000")).unwrap();
        logger.handle_request_completed(&old, "GET", b"/");
        drop(old);

        let new = LogScope::root(Some("127.0.0.1:5000")).unwrap();
        logger.handle_request_completed(&new, "GET", b"/");
        assert_eq!(logger.emitter_count(), 1);
    }
}
