//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Release sockets → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//!
//! Reload (reload.rs):
//!     Load → Validate → Check layout → Compile → Publish to workers
//! ```

pub mod reload;
pub mod shutdown;
pub mod signals;

pub use reload::{ReloadError, Reloader};
pub use shutdown::Shutdown;
pub use signals::{Signal, SignalListener};
