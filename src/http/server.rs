//! HTTP server setup and worker threads.
//!
//! # Responsibilities
//! - Bind every configured listener once
//! - Run N worker threads, each with its own single-threaded runtime
//! - Give every worker its own request logger and UDP sockets
//! - Wire up middleware (request ID, tracing, completion, timeout)
//! - Release worker sockets when a new route table is published
//!
//! # Design Decisions
//! - Listener sockets are shared by all workers; the kernel spreads connections
//! - Workers never share logging state, so no cross-thread locking on the hot path
//! - Graceful shutdown through the broadcast channel in `lifecycle::shutdown`

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::Uri,
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use futures_util::future::try_join_all;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::AppConfig;
use crate::http::completion::{
    completion_middleware, AccessLog, CompletionHooks, CompletionState, MatchedScope,
    RequestMetrics, RouteSnapshot, UdpLogSubscriber,
};
use crate::http::request::{decoded_path, propagate_request_id_layer, set_request_id_layer};
use crate::http::routes::RouteTable;
use crate::lifecycle::shutdown::Shutdown;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server \"{server}\": cannot bind {address}: {source}")]
    Bind {
        server: String,
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker {worker} failed: {source}")]
    Worker {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Multi-worker HTTP server.
pub struct HttpServer {
    config: AppConfig,
    routes: watch::Receiver<Arc<RouteTable>>,
}

impl HttpServer {
    /// `routes` carries the current route table; publishing a new one reloads every worker.
    pub fn new(config: AppConfig, routes: watch::Receiver<Arc<RouteTable>>) -> Self {
        Self { config, routes }
    }

    /// Bind all listeners and start the workers.
    pub fn start(self, shutdown: &Shutdown) -> Result<RunningServer, ServerError> {
        let mut listeners = Vec::with_capacity(self.config.servers.len());
        let mut local_addrs = Vec::with_capacity(self.config.servers.len());

        for server in &self.config.servers {
            let listener = bind(&server.bind_address).map_err(|source| ServerError::Bind {
                server: server.name.clone(),
                address: server.bind_address.clone(),
                source,
            })?;
            let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
                server: server.name.clone(),
                address: server.bind_address.clone(),
                source,
            })?;
            tracing::info!(server = %server.name, address = %local_addr, "Listening for connections");
            local_addrs.push((server.name.clone(), local_addr));
            listeners.push(listener);
        }

        let request_timeout = Duration::from_secs(self.config.timeouts.request_secs);
        let mut workers = Vec::with_capacity(self.config.workers);

        for id in 0..self.config.workers {
            let worker_listeners = listeners
                .iter()
                .map(StdTcpListener::try_clone)
                .collect::<io::Result<Vec<_>>>()
                .map_err(|source| ServerError::Spawn { worker: id, source })?;
            let shutdown_rxs = worker_listeners.iter().map(|_| shutdown.subscribe()).collect();

            let worker = Worker {
                id,
                listeners: worker_listeners,
                shutdown: shutdown_rxs,
                routes: self.routes.clone(),
                request_timeout,
            };
            let handle = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || worker.run())
                .map_err(|source| ServerError::Spawn { worker: id, source })?;
            workers.push(handle);
        }

        tracing::info!(workers = workers.len(), "HTTP server started");
        Ok(RunningServer {
            local_addrs,
            workers,
        })
    }
}

fn bind(address: &str) -> io::Result<StdTcpListener> {
    let address: SocketAddr = address
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let listener = StdTcpListener::bind(address)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Handle to the started workers.
#[derive(Debug)]
pub struct RunningServer {
    local_addrs: Vec<(String, SocketAddr)>,
    workers: Vec<thread::JoinHandle<io::Result<()>>>,
}

impl RunningServer {
    /// Bound address of each server, in configuration order.
    pub fn local_addrs(&self) -> &[(String, SocketAddr)] {
        &self.local_addrs
    }

    pub fn local_addr(&self, server: &str) -> Option<SocketAddr> {
        self.local_addrs
            .iter()
            .find(|(name, _)| name == server)
            .map(|(_, addr)| *addr)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Block until every worker has stopped.
    pub fn join(self) -> Result<(), ServerError> {
        let mut result = Ok(());
        for (worker, handle) in self.workers.into_iter().enumerate() {
            let outcome = match handle.join() {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(ServerError::Worker { worker, source }),
                Err(_) => Err(ServerError::WorkerPanicked(worker)),
            };
            if let Err(e) = outcome {
                tracing::error!(error = %e, "Worker stopped abnormally");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

struct Worker {
    id: usize,
    listeners: Vec<StdTcpListener>,
    shutdown: Vec<broadcast::Receiver<()>>,
    routes: watch::Receiver<Arc<RouteTable>>,
    request_timeout: Duration,
}

impl Worker {
    fn run(self) -> io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.serve())
    }

    async fn serve(self) -> io::Result<()> {
        let udp_log = Arc::new(UdpLogSubscriber::new());
        let mut hooks = CompletionHooks::default();
        hooks.subscribe(udp_log.clone());
        hooks.subscribe(Arc::new(AccessLog));
        hooks.subscribe(Arc::new(RequestMetrics));
        let hooks = Arc::new(hooks);

        let worker = self.id;
        let mut generations = self.routes.clone();
        let releaser = Arc::clone(&udp_log);
        tokio::spawn(async move {
            while generations.changed().await.is_ok() {
                let released = releaser.release_all();
                tracing::debug!(worker, released, "Route table replaced, UDP sockets released");
            }
        });

        let mut servers = Vec::with_capacity(self.listeners.len());
        for (index, (listener, mut shutdown)) in self
            .listeners
            .into_iter()
            .zip(self.shutdown)
            .enumerate()
        {
            let listener = TcpListener::from_std(listener)?;
            let state = CompletionState {
                server: index,
                routes: self.routes.clone(),
                hooks: Arc::clone(&hooks),
            };
            let app = build_router(state, self.request_timeout);
            servers.push(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                    })
                    .await
            });
        }

        tracing::debug!(worker, "Worker started");
        try_join_all(servers).await?;

        let released = udp_log.release_all();
        tracing::debug!(worker, released, "Worker stopped");
        Ok(())
    }
}

/// Build the router of one listener, outermost layer last.
#[allow(deprecated)]
fn build_router(state: CompletionState, request_timeout: Duration) -> Router {
    Router::new()
        .fallback(location_handler)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn_with_state(state, completion_middleware))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

/// Answer with the matched location's canned response.
async fn location_handler(Extension(snapshot): Extension<RouteSnapshot>, uri: Uri) -> Response {
    let Some(server) = snapshot.server() else {
        return axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let path = decoded_path(&uri);
    let matched = server.match_path(&String::from_utf8_lossy(&path));
    let mut response = (matched.status, matched.body.to_owned()).into_response();
    response
        .extensions_mut()
        .insert(MatchedScope(matched.scope.clone()));
    response
}
