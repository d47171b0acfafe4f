//! Reload on configuration file change.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by rename keep triggering reloads. Every matching event goes
//! through [`Reloader::reload_from_disk`], the same path as SIGHUP.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::lifecycle::reload::Reloader;

/// Keeps a running configuration in sync with its file.
pub struct ConfigWatcher {
    path: PathBuf,
    reloader: Arc<Reloader>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, reloader: Arc<Reloader>) -> Self {
        Self {
            path: path.to_path_buf(),
            reloader,
        }
    }

    /// Start watching on notify's background thread.
    ///
    /// Reloads stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(OsString::from);
        let reloader = Arc::clone(&self.reloader);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, file_name.as_deref()) => {
                    tracing::debug!(kind = ?event.kind, "Config file changed");
                    if let Err(e) = reloader.reload_from_disk() {
                        tracing::error!(error = %e, "Reload failed. Keeping current configuration.");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Whether `event` writes or replaces the watched file.
fn touches(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    let writes = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    writes
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::routes::RouteTable;
    use notify::event::{CreateKind, ModifyKind};
    use std::net::SocketAddr;
    use std::time::Instant;
    use tokio::sync::watch;

    const CONFIG: &str = r#"
workers = 1
udp_logging = "{collector}"

[[servers]]
name = "main"
bind_address = "127.0.0.1:8080"
"#;

    fn write(path: &Path, collector: &str) {
        std::fs::write(path, CONFIG.replace("{collector}", collector)).unwrap();
    }

    fn collector(table: &RouteTable) -> Option<SocketAddr> {
        table.global_scope().destination().resolved_address()
    }

    #[test]
    fn filters_events_by_file_name() {
        let name = Some(std::ffi::OsStr::new("app.toml"));
        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("/etc/app.toml".into());
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path("/etc/app.toml".into());
        let other = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("/etc/other.toml".into());
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path("/etc/app.toml".into());

        assert!(touches(&modify, name));
        assert!(touches(&create, name));
        assert!(!touches(&other, name));
        assert!(!touches(&access, name));
    }

    #[test]
    fn file_change_publishes_new_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("udp-request-log.toml");
        write(&path, "127.0.0.1:5000");

        let config = crate::config::load_config(&path).unwrap();
        let (tx, rx) = watch::channel(Arc::new(RouteTable::compile(&config).unwrap()));
        let reloader = Arc::new(Reloader::new(&path, &config, tx));
        let _watcher = ConfigWatcher::new(&path, Arc::clone(&reloader)).run().unwrap();

        write(&path, "127.0.0.1:5001");

        let expected = Some("127.0.0.1:5001".parse().unwrap());
        let deadline = Instant::now() + Duration::from_secs(10);
        while collector(&rx.borrow()) != expected {
            assert!(Instant::now() < deadline, "new configuration never published");
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(collector(&reloader.current()), expected);
    }
}
