//! UDP request logging for a multi-worker HTTP server.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod udp_log;

pub use config::schema::AppConfig;
pub use http::RouteTable;
pub use udp_log::{LogScope, RequestLogger};
