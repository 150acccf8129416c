//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     plain listener (axum::serve) ─┐
//!     tls.rs → rustls listener ─────┴→ http layer
//!
//! Outbound:
//!     ProxyForwarder → transport.rs (TransportFactory by scheme)
//!         http  → hyper-util pooled client
//!         https → reqwest client
//! ```
//!
//! # Design Decisions
//! - Upstream failures are classified once here (connect / timeout / protocol)
//! - Redirects from the upstream are relayed, never followed

pub mod tls;
pub mod transport;

pub use transport::{Transport, TransportError, TransportFactory};
