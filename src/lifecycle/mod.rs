//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every listener stops accepting → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - One coordinator is shared by the plain and TLS listeners
//! - Waiting after the trigger has fired returns immediately

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
