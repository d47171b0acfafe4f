//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → http::routes::RouteTable::compile (udp_logging resolved per scope)
//!
//! On reload (SIGHUP or watcher.rs):
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new RouteTable published to workers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, LocationConfig, ObservabilityConfig, ServerConfig};
pub use validation::ValidationError;
