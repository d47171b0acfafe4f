//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (workers > 0, status codes, bind addresses)
//! - Detect duplicate servers and locations
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - `udp_logging` values are checked later, when they are resolved

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no servers configured")]
    NoServers,

    #[error("workers must be at least 1")]
    ZeroWorkers,

    #[error("request timeout must be at least 1 second")]
    ZeroRequestTimeout,

    #[error("server name must not be empty")]
    EmptyServerName,

    #[error("duplicate server name \"{0}\"")]
    DuplicateServerName(String),

    #[error("server \"{server}\": invalid bind address \"{address}\"")]
    InvalidBindAddress { server: String, address: String },

    #[error("server \"{server}\": bind address {address} already used")]
    DuplicateBindAddress { server: String, address: SocketAddr },

    #[error("server \"{server}\": path prefix \"{prefix}\" must start with '/'")]
    InvalidPathPrefix { server: String, prefix: String },

    #[error("server \"{server}\": duplicate location \"{prefix}\"")]
    DuplicateLocation { server: String, prefix: String },

    #[error("server \"{server}\": location \"{prefix}\" has invalid status {status}")]
    InvalidStatus { server: String, prefix: String, status: u16 },
}

/// Check an [`AppConfig`] for semantic errors.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.workers == 0 {
        errors.push(ValidationError::ZeroWorkers);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.servers.is_empty() {
        errors.push(ValidationError::NoServers);
    }

    let mut names = HashSet::new();
    let mut addresses = HashSet::new();

    for server in &config.servers {
        if server.name.is_empty() {
            errors.push(ValidationError::EmptyServerName);
        } else if !names.insert(server.name.as_str()) {
            errors.push(ValidationError::DuplicateServerName(server.name.clone()));
        }

        match server.bind_address.parse::<SocketAddr>() {
            Ok(address) => {
                // Port 0 asks the OS for a fresh port, so it never collides.
                if address.port() != 0 && !addresses.insert(address) {
                    errors.push(ValidationError::DuplicateBindAddress {
                        server: server.name.clone(),
                        address,
                    });
                }
            }
            Err(_) => errors.push(ValidationError::InvalidBindAddress {
                server: server.name.clone(),
                address: server.bind_address.clone(),
            }),
        }

        let mut prefixes = HashSet::new();
        for location in &server.locations {
            if !location.path_prefix.starts_with('/') {
                errors.push(ValidationError::InvalidPathPrefix {
                    server: server.name.clone(),
                    prefix: location.path_prefix.clone(),
                });
            } else if !prefixes.insert(location.path_prefix.as_str()) {
                errors.push(ValidationError::DuplicateLocation {
                    server: server.name.clone(),
                    prefix: location.path_prefix.clone(),
                });
            }

            if !(100..=999).contains(&location.status) {
                errors.push(ValidationError::InvalidStatus {
                    server: server.name.clone(),
                    prefix: location.path_prefix.clone(),
                    status: location.status,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
