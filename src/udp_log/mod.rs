//! UDP request logging subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration load:
//!     udp_logging directive
//!     → destination.rs (off | host[:port] → Destination)
//!     → scope.rs (inherit or override per global/server/location scope)
//!
//! Request completion (per worker):
//!     (scope, method, path)
//!     → logger.rs (skip if disabled, pick emitter for destination)
//!     → record.rs (METHOD PATH (0xCRC32)\n)
//!     → emitter.rs (lazy connect, one non-blocking datagram)
//!     → errors swallowed
//! ```
//!
//! # Design Decisions
//! - Best effort only: no retry, no acknowledgement, no ordering
//! - Resolution happens once at load time, never on the request path
//! - Emitter state is per worker; nothing here locks or awaits

pub mod destination;
pub mod emitter;
pub mod logger;
pub mod record;
pub mod scope;

pub use destination::{resolve, Destination, ResolveError, DEFAULT_UDP_PORT};
pub use emitter::{TransportError, UdpEmitter};
pub use logger::RequestLogger;
pub use record::{LogRecord, ParsedRecord};
pub use scope::LogScope;
