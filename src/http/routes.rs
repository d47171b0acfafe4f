//! Compiled route table.
//!
//! # Responsibilities
//! - Resolve `udp_logging` for every global/server/location scope
//! - Store locations per server, longest prefix first
//! - Match a request path to its response and logging scope
//!
//! # Design Decisions
//! - Compiled once per configuration generation, immutable afterwards
//! - Path matching is case-sensitive prefix matching, no regex
//! - Unmatched paths answer 404 and log under the server scope

use axum::http::StatusCode;

use crate::config::loader::ConfigError;
use crate::config::schema::AppConfig;
use crate::config::validation::ValidationError;
use crate::udp_log::LogScope;

/// One configuration generation, ready to serve.
#[derive(Debug)]
pub struct RouteTable {
    global: LogScope,
    servers: Vec<ServerRoutes>,
}

/// Routes of a single virtual server.
#[derive(Debug)]
pub struct ServerRoutes {
    name: String,
    scope: LogScope,
    locations: Vec<LocationRoute>,
}

#[derive(Debug)]
struct LocationRoute {
    path_prefix: String,
    status: StatusCode,
    body: String,
    scope: LogScope,
}

/// Result of matching a path against a server.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    pub location: Option<&'a str>,
    pub status: StatusCode,
    pub body: &'a str,
    pub scope: &'a LogScope,
}

impl RouteTable {
    /// Resolve every scope of `config`. Fails on the first bad directive.
    pub fn compile(config: &AppConfig) -> Result<Self, ConfigError> {
        let global = LogScope::root(config.udp_logging.as_deref())
            .map_err(|source| destination_error("global scope".to_string(), &config.udp_logging, source))?;

        let mut servers = Vec::with_capacity(config.servers.len());
        for server in &config.servers {
            let scope = global.nested(server.udp_logging.as_deref()).map_err(|source| {
                destination_error(format!("server \"{}\"", server.name), &server.udp_logging, source)
            })?;

            let mut locations = Vec::with_capacity(server.locations.len());
            for location in &server.locations {
                let status = StatusCode::from_u16(location.status).map_err(|_| {
                    ConfigError::Validation(vec![ValidationError::InvalidStatus {
                        server: server.name.clone(),
                        prefix: location.path_prefix.clone(),
                        status: location.status,
                    }])
                })?;
                let location_scope = scope.nested(location.udp_logging.as_deref()).map_err(|source| {
                    destination_error(
                        format!("location \"{}\" in server \"{}\"", location.path_prefix, server.name),
                        &location.udp_logging,
                        source,
                    )
                })?;
                locations.push(LocationRoute {
                    path_prefix: location.path_prefix.clone(),
                    status,
                    body: location.body.clone(),
                    scope: location_scope,
                });
            }
            // Longest prefix first; stable sort keeps config order for ties.
            locations.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));

            servers.push(ServerRoutes {
                name: server.name.clone(),
                scope,
                locations,
            });
        }

        Ok(Self { global, servers })
    }

    pub fn global_scope(&self) -> &LogScope {
        &self.global
    }

    pub fn servers(&self) -> &[ServerRoutes] {
        &self.servers
    }

    pub fn server(&self, index: usize) -> Option<&ServerRoutes> {
        self.servers.get(index)
    }
}

fn destination_error(
    scope: String,
    value: &Option<String>,
    source: crate::udp_log::ResolveError,
) -> ConfigError {
    ConfigError::Destination {
        scope,
        value: value.clone().unwrap_or_default(),
        source,
    }
}

impl ServerRoutes {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &LogScope {
        &self.scope
    }

    /// Logging scope of the location with exactly this prefix.
    pub fn location_scope(&self, path_prefix: &str) -> Option<&LogScope> {
        self.locations
            .iter()
            .find(|l| l.path_prefix == path_prefix)
            .map(|l| &l.scope)
    }

    /// Longest-prefix match of `path`.
    pub fn match_path(&self, path: &str) -> RouteMatch<'_> {
        match self.locations.iter().find(|l| path.starts_with(&l.path_prefix)) {
            Some(location) => RouteMatch {
                location: Some(&location.path_prefix),
                status: location.status,
                body: &location.body,
                scope: &location.scope,
            },
            None => RouteMatch {
                location: None,
                status: StatusCode::NOT_FOUND,
                body: "Not Found",
                scope: &self.scope,
            },
        }
    }
}
