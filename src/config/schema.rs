//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from the TOML file.
//! `udp_logging` may appear at the top level, per server and per location;
//! a scope that leaves it out inherits from the enclosing one.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of worker threads, each with its own runtime and UDP sockets.
    pub workers: usize,

    /// Reload automatically when the configuration file changes.
    pub watch: bool,

    /// Global `udp_logging` directive (`off` or `host[:port]`).
    pub udp_logging: Option<String>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Virtual servers, each with its own listener.
    pub servers: Vec<ServerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            watch: false,
            udp_logging: None,
            observability: ObservabilityConfig::default(),
            timeouts: TimeoutConfig::default(),
            servers: Vec::new(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A virtual server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server identifier for logging and error messages.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Server-level `udp_logging` directive.
    #[serde(default)]
    pub udp_logging: Option<String>,

    /// Path-prefix locations.
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

/// A path-prefix location inside a server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocationConfig {
    /// Path prefix to match (longest prefix wins).
    pub path_prefix: String,

    /// Location-level `udp_logging` directive.
    #[serde(default)]
    pub udp_logging: Option<String>,

    /// Status code returned for matching requests.
    #[serde(default = "default_status")]
    pub status: u16,

    /// Body returned for matching requests.
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let config: AppConfig = toml::from_str(
            r#"
            workers = 2
            udp_logging = "127.0.0.1:60228"

            [observability]
            log_format = "json"

            [[servers]]
            name = "main"
            bind_address = "127.0.0.1:8080"
            udp_logging = "off"

            [[servers.locations]]
            path_prefix = "/api"
            udp_logging = "127.0.0.1:5000"
            body = "api"
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.udp_logging.as_deref(), Some("127.0.0.1:60228"));
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.servers[0].udp_logging.as_deref(), Some("off"));
        let location = &config.servers[0].locations[0];
        assert_eq!(location.status, 200);
        assert_eq!(location.body, "api");
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.workers >= 1);
        assert!(!config.watch);
        assert!(config.udp_logging.is_none());
        assert!(config.servers.is_empty());
        assert_eq!(config.timeouts.request_secs, 30);
    }
}
