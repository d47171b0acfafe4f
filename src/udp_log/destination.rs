//! Destination resolution for the `udp_logging` directive.
//!
//! # Responsibilities
//! - Recognize the literal `off`
//! - Split `host[:port]` (IPv6 literals in brackets) and apply the default port
//! - Resolve the host once, at configuration time
//!
//! # Design Decisions
//! - `off` is an exact, case-sensitive match; anything else is a host
//! - First resolved candidate wins
//! - Resolution never happens on the request path

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use thiserror::Error;

/// Port used when the directive names a host without a port.
pub const DEFAULT_UDP_PORT: u16 = 60228;

/// Directive value that disables UDP logging for a scope.
pub const OFF: &str = "off";

/// Error produced while resolving a directive value.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{value}: no host")]
    NoHost { value: String },

    #[error("{value}: invalid character in host")]
    InvalidHost { value: String },

    #[error("{value}: invalid port")]
    InvalidPort { value: String },

    #[error("{value}: invalid IPv6 address")]
    InvalidIpv6 { value: String },

    #[error("{host}: host not found: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{host}: host not found")]
    NoAddresses { host: String },
}

/// Resolved collector endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collector {
    addr: SocketAddr,
    display_name: String,
}

impl Collector {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            display_name: addr.to_string(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Human-readable form of the resolved address, for diagnostics only.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Where log datagrams for a scope go, if anywhere.
///
/// Immutable once built. Scopes share it through `Arc` so that nested scopes
/// which do not override the directive point at the same descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Logging disabled (`off`, or never configured).
    Off,
    /// Send datagrams to this collector.
    Udp(Collector),
}

impl Destination {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Destination::Udp(_))
    }

    pub fn collector(&self) -> Option<&Collector> {
        match self {
            Destination::Off => None,
            Destination::Udp(collector) => Some(collector),
        }
    }

    pub fn resolved_address(&self) -> Option<SocketAddr> {
        self.collector().map(Collector::addr)
    }

    pub fn display_name(&self) -> &str {
        match self {
            Destination::Off => OFF,
            Destination::Udp(collector) => collector.display_name(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Resolve a directive value into a [`Destination`].
pub fn resolve(value: &str) -> Result<Destination, ResolveError> {
    if value == OFF {
        return Ok(Destination::Off);
    }

    let (host, port) = split_host_port(value)?;

    let mut candidates = (host, port)
        .to_socket_addrs()
        .map_err(|source| ResolveError::Lookup {
            host: host.to_string(),
            source,
        })?;

    let addr = candidates.next().ok_or_else(|| ResolveError::NoAddresses {
        host: host.to_string(),
    })?;

    Ok(Destination::Udp(Collector::new(addr)))
}

/// Split `host[:port]`, `[v6][:port]` or a bare IPv6 literal.
fn split_host_port(value: &str) -> Result<(&str, u16), ResolveError> {
    if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| ResolveError::InvalidIpv6 {
            value: value.to_string(),
        })?;
        if host.parse::<Ipv6Addr>().is_err() {
            return Err(ResolveError::InvalidIpv6 {
                value: value.to_string(),
            });
        }
        let port = match tail {
            "" => DEFAULT_UDP_PORT,
            _ => match tail.strip_prefix(':') {
                Some(port) => parse_port(value, port)?,
                None => {
                    return Err(ResolveError::InvalidPort {
                        value: value.to_string(),
                    })
                }
            },
        };
        return Ok((host, port));
    }

    // More than one colon without brackets can only be a bare IPv6 literal.
    if value.matches(':').count() > 1 {
        return match value.parse::<IpAddr>() {
            Ok(_) => Ok((value, DEFAULT_UDP_PORT)),
            Err(_) => Err(ResolveError::InvalidIpv6 {
                value: value.to_string(),
            }),
        };
    }

    let (host, port) = match value.split_once(':') {
        Some((host, port)) => (host, parse_port(value, port)?),
        None => (value, DEFAULT_UDP_PORT),
    };

    if host.is_empty() {
        return Err(ResolveError::NoHost {
            value: value.to_string(),
        });
    }
    if host.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ResolveError::InvalidHost {
            value: value.to_string(),
        });
    }

    Ok((host, port))
}

fn parse_port(value: &str, port: &str) -> Result<u16, ResolveError> {
    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ResolveError::InvalidPort {
            value: value.to_string(),
        }),
    }
}
