//! Configuration reload.
//!
//! # Responsibilities
//! - Load, validate and compile a new configuration
//! - Refuse changes that need new listeners or workers
//! - Publish the new route table to every worker
//!
//! # Design Decisions
//! - Any failure keeps the running generation untouched
//! - Workers release their UDP sockets when they see the new generation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::AppConfig;
use crate::http::routes::RouteTable;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("listeners or worker count changed; restart required")]
    LayoutChanged,
}

/// What cannot change without a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    workers: usize,
    listeners: Vec<(String, String)>,
}

impl Layout {
    fn of(config: &AppConfig, workers_override: Option<usize>) -> Self {
        Self {
            workers: workers_override.unwrap_or(config.workers),
            listeners: config
                .servers
                .iter()
                .map(|s| (s.name.clone(), s.bind_address.clone()))
                .collect(),
        }
    }
}

/// Publishes new route table generations.
pub struct Reloader {
    path: PathBuf,
    layout: Layout,
    workers_override: Option<usize>,
    routes: watch::Sender<Arc<RouteTable>>,
}

impl Reloader {
    /// `running` is the configuration the workers were started with.
    pub fn new(path: &Path, running: &AppConfig, routes: watch::Sender<Arc<RouteTable>>) -> Self {
        Self {
            path: path.to_path_buf(),
            layout: Layout::of(running, None),
            workers_override: None,
            routes,
        }
    }

    /// Worker count forced on the command line; reloaded files cannot change it.
    pub fn with_workers_override(mut self, workers: Option<usize>) -> Self {
        self.workers_override = workers;
        if let Some(workers) = workers {
            self.layout.workers = workers;
        }
        self
    }

    /// Re-read the configuration file and apply it.
    pub fn reload_from_disk(&self) -> Result<(), ReloadError> {
        tracing::info!(path = %self.path.display(), "Reloading configuration");
        let config = load_config(&self.path)?;
        self.apply(&config)
    }

    /// Apply an already validated configuration.
    pub fn apply(&self, config: &AppConfig) -> Result<(), ReloadError> {
        if Layout::of(config, self.workers_override) != self.layout {
            return Err(ReloadError::LayoutChanged);
        }
        let table = RouteTable::compile(config)?;
        self.routes.send_replace(Arc::new(table));
        tracing::info!(servers = config.servers.len(), "Configuration reloaded");
        Ok(())
    }

    /// The generation currently served.
    pub fn current(&self) -> Arc<RouteTable> {
        self.routes.borrow().clone()
    }
}
