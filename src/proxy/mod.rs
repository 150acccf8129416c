//! Upstream forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext + request body
//!     → forwarder.rs (absolute upstream URI, transport by scheme)
//!     → upstream response head → ResponseMetadata
//!     ├─ HTML for a requested language: buffer, cache original, translate
//!     └─ otherwise: stream to the client, buffer on the side for the cache
//! ```
//!
//! # Design Decisions
//! - Upstream failures stop before the cache layer
//! - A client that goes away does not stop a cacheable download

pub mod forwarder;

pub use forwarder::ProxyForwarder;
