//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! plain / TLS listener
//!     → server.rs (Axum setup, one handler for every method and path)
//!     → request.rs (request ID, host/port resolution, lang extraction)
//!     → pipeline.rs (firewall → purge → cache lookup → forwarder)
//!     → response.rs (buffered, 304 or translated answers)
//!     → error.rs (failures rendered as "Error NNN: reason")
//!     → Send to client
//! ```

pub mod encoding;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

use axum::http::Method;

pub use error::ProxyError;
pub use pipeline::{Exchange, Outcome, Pipeline, Stage};
pub use request::{RequestContext, Scheme, X_REQUEST_ID};
pub use response::ResponseDispatcher;
pub use server::{HttpServer, StartupError};

/// PURGE is an extension method, so it cannot be matched as a constant.
pub fn is_purge(method: &Method) -> bool {
    method.as_str() == "PURGE"
}
