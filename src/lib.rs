//! Caching, translating reverse proxy library.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod security;
pub mod translation;

pub use config::schema::ProxyConfig;
pub use http::{HttpServer, StartupError};
pub use lifecycle::Shutdown;
