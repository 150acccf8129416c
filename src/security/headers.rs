//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Real-IP
//! - Strip hop-by-hop headers
//!
//! # Design Decisions
//! - An X-Forwarded-For set by the first hop is kept as-is
//! - X-Forwarded-Proto and X-Real-IP are always derived, never trusted

use std::net::IpAddr;

use axum::http::{HeaderMap, HeaderValue};

use crate::http::request::Scheme;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_REAL_IP: &str = "x-real-ip";

/// Headers meaningful only for a single transport-level connection.
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all("connection")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in HOP_BY_HOP.iter().copied() {
        headers.remove(name);
    }
    for name in listed {
        headers.remove(name.as_str());
    }
}

/// Set the forwarding headers describing the client.
pub fn apply_forwarding_headers(headers: &mut HeaderMap, remote_ip: IpAddr, scheme: Scheme) {
    let ip = HeaderValue::from_str(&remote_ip.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));

    if !headers.contains_key(X_FORWARDED_FOR) {
        headers.insert(X_FORWARDED_FOR, ip.clone());
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(scheme.as_str()));
    headers.insert(X_REAL_IP, ip);
}
