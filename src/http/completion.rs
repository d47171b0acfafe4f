//! Request-completed event dispatch.
//!
//! # Data Flow
//! ```text
//! request
//!     → completion_middleware (snapshot route table, note method/path/id)
//!     → location handler (tags response with MatchedScope)
//!     → completion_middleware (RequestCompleted → every subscriber)
//!         → UdpLogSubscriber (datagram to the scope's collector)
//!         → AccessLog (tracing event)
//!         → RequestMetrics (counters, latency)
//! ```
//!
//! # Design Decisions
//! - Subscribers run after the response is produced and cannot alter it
//! - The route table generation is pinned per request so the handler and
//!   the subscribers see the same scopes
//! - Responses not produced by the handler (timeouts) log under the server scope
//! - The path is reported percent-decoded, as raw bytes
//! - A request finishing on a replaced generation lets subscribers drop
//!   state only that generation referenced

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::watch;

use crate::http::request::{decoded_path, request_id};
use crate::http::routes::{RouteTable, ServerRoutes};
use crate::observability::metrics;
use crate::udp_log::{LogScope, RequestLogger};

/// A request the host has finished answering.
#[derive(Debug, Clone, Copy)]
pub struct RequestCompleted<'a> {
    pub method: &'a str,
    pub path: &'a [u8],
    pub status: StatusCode,
    pub request_id: Option<&'a str>,
    pub elapsed: Duration,
}

/// Something that wants to hear about every completed request.
pub trait CompletionSubscriber: Send + Sync {
    fn on_request_completed(&self, scope: &LogScope, event: &RequestCompleted<'_>);

    /// A request served by a replaced route table has finished.
    fn on_generation_retired(&self) {}
}

/// Ordered list of subscribers, shared by every listener of one worker.
#[derive(Clone, Default)]
pub struct CompletionHooks {
    subscribers: Vec<Arc<dyn CompletionSubscriber>>,
}

impl CompletionHooks {
    pub fn subscribe(&mut self, subscriber: Arc<dyn CompletionSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn dispatch(&self, scope: &LogScope, event: &RequestCompleted<'_>) {
        for subscriber in &self.subscribers {
            subscriber.on_request_completed(scope, event);
        }
    }

    pub fn retire_generation(&self) {
        for subscriber in &self.subscribers {
            subscriber.on_generation_retired();
        }
    }
}

/// Sends one UDP datagram per request to the scope's collector.
///
/// Owned by a single worker thread; the mutex is never contended.
#[derive(Debug, Default)]
pub struct UdpLogSubscriber {
    logger: Mutex<RequestLogger>,
}

impl UdpLogSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close every socket. Called when a new configuration generation is published.
    pub fn release_all(&self) -> usize {
        self.logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release_all()
    }

    pub fn connected_count(&self) -> usize {
        self.logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .connected_count()
    }
}

impl CompletionSubscriber for UdpLogSubscriber {
    fn on_request_completed(&self, scope: &LogScope, event: &RequestCompleted<'_>) {
        if !scope.is_enabled() {
            return;
        }
        self.logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle_request_completed(scope, event.method, event.path);
    }

    fn on_generation_retired(&self) {
        let released = self
            .logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release_unreferenced();
        if released > 0 {
            tracing::debug!(released, "Released UDP sockets of a replaced route table");
        }
    }
}

/// Structured access log line per request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessLog;

impl CompletionSubscriber for AccessLog {
    fn on_request_completed(&self, scope: &LogScope, event: &RequestCompleted<'_>) {
        tracing::info!(
            target: "udp_request_log::access",
            request_id = event.request_id.unwrap_or("unknown"),
            method = event.method,
            path = %String::from_utf8_lossy(event.path),
            status = event.status.as_u16(),
            elapsed_ms = event.elapsed.as_millis() as u64,
            udp_logging = %scope.destination(),
            "Request completed"
        );
    }
}

/// Request counters and latency histogram.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestMetrics;

impl CompletionSubscriber for RequestMetrics {
    fn on_request_completed(&self, _scope: &LogScope, event: &RequestCompleted<'_>) {
        metrics::record_request(event.method, event.status.as_u16(), event.elapsed);
    }
}

/// Logging scope chosen by the handler, carried on the response.
#[derive(Debug, Clone)]
pub struct MatchedScope(pub LogScope);

/// The route table generation a request is served with.
#[derive(Clone)]
pub struct RouteSnapshot {
    table: Arc<RouteTable>,
    server: usize,
}

impl RouteSnapshot {
    pub fn new(table: Arc<RouteTable>, server: usize) -> Self {
        Self { table, server }
    }

    pub fn server(&self) -> Option<&ServerRoutes> {
        self.table.server(self.server)
    }

    fn fallback_scope(&self) -> LogScope {
        match self.server() {
            Some(server) => server.scope().clone(),
            None => self.table.global_scope().clone(),
        }
    }
}

/// State of [`completion_middleware`] for one listener of one worker.
#[derive(Clone)]
pub struct CompletionState {
    pub server: usize,
    pub routes: watch::Receiver<Arc<RouteTable>>,
    pub hooks: Arc<CompletionHooks>,
}

/// Pin the route table, run the request, then announce its completion.
pub async fn completion_middleware(
    State(state): State<CompletionState>,
    mut request: Request,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let snapshot = RouteSnapshot::new(state.routes.borrow().clone(), state.server);

    let method: Method = request.method().clone();
    let uri = request.uri().clone();
    let id = request_id(&request).map(str::to_owned);
    request.extensions_mut().insert(snapshot.clone());

    let mut response = next.run(request).await;

    let scope = match response.extensions_mut().remove::<MatchedScope>() {
        Some(MatchedScope(scope)) => scope,
        None => snapshot.fallback_scope(),
    };
    let path = decoded_path(&uri);
    let event = RequestCompleted {
        method: method.as_str(),
        path: &path,
        status: response.status(),
        request_id: id.as_deref(),
        elapsed: start_time.elapsed(),
    };
    state.hooks.dispatch(&scope, &event);

    let retired = !Arc::ptr_eq(&snapshot.table, &*state.routes.borrow());
    drop(scope);
    drop(snapshot);
    if retired {
        state.hooks.retire_generation();
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        enabled: AtomicUsize,
        total: AtomicUsize,
    }

    impl CompletionSubscriber for Counting {
        fn on_request_completed(&self, scope: &LogScope, _event: &RequestCompleted<'_>) {
            self.total.fetch_add(1, Ordering::SeqCst);
            if scope.is_enabled() {
                self.enabled.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn event() -> RequestCompleted<'static> {
        RequestCompleted {
            method: "GET",
            path: b"/",
            status: StatusCode::OK,
            request_id: None,
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn dispatch_reaches_every_subscriber() {
        let first = Arc::new(Counting::default());
        let second = Arc::new(Counting::default());
        let mut hooks = CompletionHooks::default();
        hooks.subscribe(first.clone());
        hooks.subscribe(second.clone());
        hooks.subscribe(Arc::new(AccessLog));

        hooks.dispatch(&LogScope::disabled(), &event());

        assert_eq!(hooks.len(), 3);
        assert_eq!(first.total.load(Ordering::SeqCst), 1);
        assert_eq!(second.total.load(Ordering::SeqCst), 1);
        assert_eq!(first.enabled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn udp_subscriber_connects_lazily() {
        let collector = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let scope = LogScope::root(Some(&collector.local_addr().unwrap().to_string())).unwrap();
        let subscriber = UdpLogSubscriber::new();

        subscriber.on_request_completed(&LogScope::disabled(), &event());
        assert_eq!(subscriber.connected_count(), 0);

        subscriber.on_request_completed(&scope, &event());
        assert_eq!(subscriber.connected_count(), 1);

        collector
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = [0u8; 128];
        let len = collector.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"GET / (0x79d3d2d4)\n" as &[u8]);

        assert_eq!(subscriber.release_all(), 1);
        assert_eq!(subscriber.connected_count(), 0);
    }

    #[test]
    fn retired_generation_releases_only_orphaned_sockets() {
        let collector = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let directive = collector.local_addr().unwrap().to_string();
        let current = LogScope::root(Some(&directive)).unwrap();
        let replaced = LogScope::root(Some(&directive)).unwrap();
        let subscriber = UdpLogSubscriber::new();

        subscriber.on_request_completed(&current, &event());
        subscriber.on_request_completed(&replaced, &event());
        assert_eq!(subscriber.connected_count(), 2);

        subscriber.on_generation_retired();
        assert_eq!(subscriber.connected_count(), 2);

        drop(replaced);
        subscriber.on_generation_retired();
        assert_eq!(subscriber.connected_count(), 1);
    }

    #[test]
    fn access_log_accepts_non_utf8_paths() {
        let mut hooks = CompletionHooks::default();
        hooks.subscribe(Arc::new(AccessLog));
        let event = RequestCompleted {
            path: b"/raw\xff",
            ..event()
        };
        hooks.dispatch(&LogScope::disabled(), &event);
        hooks.retire_generation();
    }
}
