//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → firewall.rs (host allow-list, PURGE allow-list)
//!     → Pass to cache / proxy stages
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any allow-list miss
//! - No trust in client-supplied forwarding headers beyond the first hop

pub mod firewall;
pub mod headers;

pub use firewall::{Firewall, Verdict};
