//! Request normalization.
//!
//! # Responsibilities
//! - Assign a monotonically increasing, fixed-width request ID
//! - Resolve requested host/port and the upstream target
//! - Extract the `lang` query parameter and strip it from the forwarded path
//! - Prepare forwarding headers for the upstream request
//!
//! # Design Decisions
//! - The context is built once at ingress and never mutated afterwards
//! - The ID counter belongs to the server instance, not to a global
//! - No I/O happens here; the only side effect is the access log record

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::{request::Parts, HeaderMap, Method};

use crate::config::UpstreamConfig;
use crate::security::headers::{apply_forwarding_headers, strip_hop_by_hop};

/// Header carrying the request ID on forwarded requests.
pub const X_REQUEST_ID: &str = "x-request-id";

const LANG_PARAM: &str = "lang";

/// Transport the client used to reach the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, immutable view of one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Fixed-width sequence number for log correlation.
    pub id: String,
    pub scheme: Scheme,
    pub method: Method,
    /// Host as received in the `Host` header.
    pub requested_host: String,
    /// Port as received in the `Host` header, if explicit.
    pub requested_port: Option<u16>,
    /// Upstream host.
    pub host: String,
    /// Upstream port.
    pub port: u16,
    /// Path and query, without the `lang` parameter.
    pub path: String,
    /// Requested translation language, `None` for the original.
    pub lang: Option<String>,
    pub remote_ip: IpAddr,
    /// Headers to forward upstream.
    pub headers: HeaderMap,
    /// Canonical absolute URL of the upstream resource.
    pub href: String,
}

impl RequestContext {
    /// `scheme://host[:port]`, port omitted when it is the scheme default.
    pub fn origin(&self) -> String {
        if self.port == self.scheme.default_port() {
            format!("{}://{}", self.scheme, self.host)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        }
    }

    /// Absolute URL of the resource, optionally qualified by a language.
    pub fn full_url(&self, lang: Option<&str>) -> String {
        let mut url = format!("{}{}", self.origin(), self.path);
        if let Some(lang) = lang {
            url.push(if self.path.contains('?') { '&' } else { '?' });
            url.push_str(LANG_PARAM);
            url.push('=');
            url.push_str(lang);
        }
        url
    }

    /// Query string of the forwarded path.
    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, q)| q)
    }

    /// Header value as a string, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Copy of this context with a different method, used to address
    /// per-method cache entries.
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }
}

/// Monotonic request counter owned by a server instance.
#[derive(Debug, Default)]
pub struct RequestSequence {
    counter: AtomicU64,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next ID, zero-padded so IDs sort lexically.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{:010}", n)
    }
}

/// Builds a [`RequestContext`] from the raw request head.
#[derive(Debug, Clone)]
pub struct RequestContextBuilder {
    sequence: Arc<RequestSequence>,
    http_port: Option<u16>,
    https_port: Option<u16>,
}

impl RequestContextBuilder {
    pub fn new(config: &UpstreamConfig, sequence: Arc<RequestSequence>) -> Self {
        Self {
            sequence,
            http_port: config.http_port,
            https_port: config.https_port,
        }
    }

    pub fn build(&self, parts: &Parts, scheme: Scheme, peer: SocketAddr) -> RequestContext {
        let id = self.sequence.next_id();

        let raw_host = parts
            .headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();
        let (requested_host, requested_port) = split_host_port(&raw_host);

        let override_port = match scheme {
            Scheme::Http => self.http_port,
            Scheme::Https => self.https_port,
        };
        let port = override_port
            .or(requested_port)
            .unwrap_or_else(|| scheme.default_port());

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let (path, lang) = extract_lang(path_and_query);

        let remote_ip = peer.ip();
        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        apply_forwarding_headers(&mut headers, remote_ip, scheme);
        if let Ok(value) = id.parse() {
            headers.insert(X_REQUEST_ID, value);
        }

        let mut ctx = RequestContext {
            id,
            scheme,
            method: parts.method.clone(),
            host: requested_host.to_ascii_lowercase(),
            requested_host,
            requested_port,
            port,
            path,
            lang,
            remote_ip,
            headers,
            href: String::new(),
        };
        ctx.href = ctx.full_url(None);

        tracing::info!(
            target: "access",
            request_id = %ctx.id,
            remote_ip = %ctx.remote_ip,
            method = %ctx.method,
            href = %ctx.href,
            lang = ctx.lang.as_deref().unwrap_or("-"),
            "request"
        );

        ctx
    }
}

/// Split `host[:port]`, honouring bracketed IPv6 literals.
fn split_host_port(raw: &str) -> (String, Option<u16>) {
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (host.to_string(), port);
        }
    }
    match raw.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (raw.to_string(), None),
        },
        _ => (raw.to_string(), None),
    }
}

/// Remove every `lang` pair from the query, returning the first value when
/// it is a plausible language code. Other pairs are kept verbatim.
fn extract_lang(path_and_query: &str) -> (String, Option<String>) {
    let Some((path, query)) = path_and_query.split_once('?') else {
        return (path_and_query.to_string(), None);
    };

    let mut lang = None;
    let mut seen = false;
    let mut kept = Vec::new();
    for pair in query.split('&') {
        let key = pair.split_once('=').map(|(k, _)| k).unwrap_or(pair);
        if key == LANG_PARAM {
            if !seen {
                seen = true;
                let value = pair.split_once('=').map(|(_, v)| v).unwrap_or("");
                if is_language_code(value) {
                    lang = Some(value.to_string());
                }
            }
            continue;
        }
        kept.push(pair);
    }

    if kept.is_empty() {
        (path.to_string(), lang)
    } else {
        (format!("{}?{}", path, kept.join("&")), lang)
    }
}

/// `[a-z][a-zA-Z-]+`
fn is_language_code(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    let rest = chars.as_str();
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
}
