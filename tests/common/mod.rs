//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use udp_request_log::config::{load_config, AppConfig, LocationConfig, ServerConfig};
use udp_request_log::http::{HttpServer, RouteTable, RunningServer};
use udp_request_log::lifecycle::{Reloader, Shutdown};

/// A UDP collector bound to an ephemeral loopback port.
pub struct Collector {
    socket: UdpSocket,
}

impl Collector {
    pub async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    /// The `udp_logging` value pointing at this collector.
    pub fn directive(&self) -> String {
        self.socket.local_addr().unwrap().to_string()
    }

    /// Next datagram, or `None` if nothing arrives within `wait`.
    pub async fn recv_within(&self, wait: Duration) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; 64 * 1024];
        match tokio::time::timeout(wait, self.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                Some(buf)
            }
            _ => None,
        }
    }

    pub async fn recv(&self) -> Vec<u8> {
        self.recv_within(Duration::from_secs(2))
            .await
            .expect("no datagram received")
    }

    /// Assert that nothing arrives for a short while.
    pub async fn assert_silent(&self) {
        if let Some(datagram) = self.recv_within(Duration::from_millis(300)).await {
            panic!("unexpected datagram: {:?}", String::from_utf8_lossy(&datagram));
        }
    }
}

/// The datagram the logger sends for a request.
pub fn expected_record(method: &str, path: &str) -> Vec<u8> {
    format!("{method} {path} (0x{:08x})\n", crc32fast::hash(path.as_bytes())).into_bytes()
}

pub fn location(prefix: &str, udp_logging: Option<&str>) -> LocationConfig {
    LocationConfig {
        path_prefix: prefix.into(),
        udp_logging: udp_logging.map(Into::into),
        status: 200,
        body: format!("location {prefix}"),
    }
}

pub fn server(name: &str, udp_logging: Option<&str>, locations: Vec<LocationConfig>) -> ServerConfig {
    ServerConfig {
        name: name.into(),
        bind_address: "127.0.0.1:0".into(),
        udp_logging: udp_logging.map(Into::into),
        locations,
    }
}

pub fn config(workers: usize, udp_logging: Option<&str>, servers: Vec<ServerConfig>) -> AppConfig {
    let mut config = AppConfig::default();
    config.workers = workers;
    config.udp_logging = udp_logging.map(Into::into);
    config.servers = servers;
    config
}

/// A running server with its control handles.
pub struct TestServer {
    pub running: RunningServer,
    pub shutdown: Shutdown,
    pub reloader: Reloader,
}

impl TestServer {
    pub fn start(config: AppConfig) -> Self {
        Self::start_with_path(Path::new("udp-request-log.toml"), config)
    }

    /// Start from a configuration file; reloads re-read the same file.
    pub fn start_from(path: &Path) -> Self {
        Self::start_with_path(path, load_config(path).unwrap())
    }

    fn start_with_path(path: &Path, config: AppConfig) -> Self {
        let table = RouteTable::compile(&config).unwrap();
        let (routes, routes_rx) = watch::channel(Arc::new(table));
        let shutdown = Shutdown::new();
        let reloader = Reloader::new(path, &config, routes);
        let running = HttpServer::new(config, routes_rx).start(&shutdown).unwrap();
        Self {
            running,
            shutdown,
            reloader,
        }
    }

    pub fn url(&self, server: &str, path: &str) -> String {
        let addr: SocketAddr = self.running.local_addr(server).unwrap();
        format!("http://{addr}{path}")
    }

    /// Publish a new route table, as a reload would.
    pub fn publish(&self, config: &AppConfig) {
        self.reloader.apply(config).unwrap();
    }

    /// Trigger shutdown and wait for every worker to exit.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let running = self.running;
        tokio::task::spawn_blocking(move || running.join())
            .await
            .unwrap()
            .unwrap();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
