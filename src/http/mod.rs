//! HTTP host subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (one of N worker threads)
//!     → request.rs (request ID)
//!     → completion.rs (pin route table generation)
//!     → routes.rs (longest-prefix location match)
//!     → canned location response
//!     → completion.rs (request-completed event → UDP log, access log, metrics)
//!     → Send to client
//! ```

pub mod completion;
pub mod request;
pub mod routes;
pub mod server;

pub use completion::{CompletionSubscriber, RequestCompleted};
pub use request::X_REQUEST_ID;
pub use routes::RouteTable;
pub use server::{HttpServer, RunningServer, ServerError};
