//! Logging scopes and directive inheritance.
//!
//! A scope is global, server or location level. A scope that does not set
//! `udp_logging` shares its parent's descriptor (same allocation); an
//! unconfigured root is disabled.

use std::sync::Arc;

use crate::udp_log::destination::{resolve, Destination, ResolveError};

/// The effective logging destination of one configuration scope.
#[derive(Debug, Clone)]
pub struct LogScope {
    destination: Arc<Destination>,
}

impl LogScope {
    /// A scope with logging turned off.
    pub fn disabled() -> Self {
        Self {
            destination: Arc::new(Destination::Off),
        }
    }

    /// The outermost scope. Unset means disabled.
    pub fn root(directive: Option<&str>) -> Result<Self, ResolveError> {
        match directive {
            Some(value) => Self::resolve(value),
            None => Ok(Self::disabled()),
        }
    }

    /// A scope nested in `self`. Unset means inherit.
    pub fn nested(&self, directive: Option<&str>) -> Result<Self, ResolveError> {
        match directive {
            Some(value) => Self::resolve(value),
            None => Ok(self.clone()),
        }
    }

    fn resolve(value: &str) -> Result<Self, ResolveError> {
        Ok(Self {
            destination: Arc::new(resolve(value)?),
        })
    }

    pub fn destination(&self) -> &Arc<Destination> {
        &self.destination
    }

    pub fn is_enabled(&self) -> bool {
        self.destination.is_enabled()
    }

    /// Whether both scopes use the very same descriptor.
    pub fn shares_destination(&self, other: &LogScope) -> bool {
        Arc::ptr_eq(&self.destination, &other.destination)
    }
}
