//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the translating proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind addresses, TLS).
    pub listener: ListenerConfig,

    /// Upstream allow-list and target ports.
    pub upstream: UpstreamConfig,

    /// PURGE verb access control.
    pub purge: PurgeConfig,

    /// Response cache policy and backing store.
    pub cache: CacheConfig,

    /// Translation engine tuning.
    pub translation: TranslationConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plain HTTP bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional HTTPS listener.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the HTTPS listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// HTTPS bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Hosts the proxy is willing to forward to (exact, case-insensitive).
    pub proxied_hosts: Vec<String>,

    /// Upstream port for plain HTTP requests. Overrides the `Host` port.
    pub http_port: Option<u16>,

    /// Upstream port for HTTPS requests. Overrides the `Host` port.
    pub https_port: Option<u16>,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            proxied_hosts: Vec::new(),
            http_port: None,
            https_port: None,
            connect_timeout_secs: 5,
        }
    }
}

/// PURGE access control.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PurgeConfig {
    /// Client IPs allowed to issue PURGE requests.
    pub allowed_ips: Vec<String>,

    /// Query pair that turns a PURGE into a full cache flush.
    pub bulk_marker: String,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            allowed_ips: vec!["127.0.0.1".to_string(), "::1".to_string()],
            bulk_marker: "page=all".to_string(),
        }
    }
}

/// One entry of the ordered TTL table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TtlRule {
    /// Content-type prefix, or `"default"` for the fallback entry.
    #[serde(rename = "match")]
    pub match_pattern: String,

    /// Time-to-live in seconds.
    pub seconds: u64,
}

impl TtlRule {
    pub fn new(match_pattern: impl Into<String>, seconds: u64) -> Self {
        Self {
            match_pattern: match_pattern.into(),
            seconds,
        }
    }
}

/// Backing store selection.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Redis,
}

/// Key-value store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Which store implementation to use.
    pub kind: StoreKind,

    /// Address of the RESP server (redis kind only).
    pub address: String,

    /// Per-command timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            address: "127.0.0.1:6379".to_string(),
            timeout_ms: 500,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global cache switch.
    pub enabled: bool,

    /// URL substrings that bypass the cache.
    pub skip_urls: Vec<String>,

    /// Cookie substrings that bypass the cache.
    pub skip_cookies: Vec<String>,

    /// Ordered TTL table, first match wins.
    pub ttl: Vec<TtlRule>,

    /// TTL applied to volatile status codes.
    pub short_ttl_secs: u64,

    /// Status codes that get `short_ttl_secs`.
    pub short_ttl_statuses: Vec<u16>,

    /// Backing store.
    pub store: StoreConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_urls: Vec::new(),
            skip_cookies: Vec::new(),
            ttl: vec![
                TtlRule::new("text/html", 300),
                TtlRule::new("default", 3600),
            ],
            short_ttl_secs: 10,
            short_ttl_statuses: vec![301, 302, 303, 307, 308, 500, 502, 503, 504],
            store: StoreConfig::default(),
        }
    }
}

/// Translation engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Translation API endpoint.
    pub api_url: String,

    /// API key passed as the `key` query parameter.
    pub api_key: String,

    /// Language of upstream documents.
    pub source_lang: String,

    /// Documents larger than this (bytes) are not translated.
    pub max_page_size: usize,

    /// Upper bound (bytes) of serialized markup per API call.
    pub chunk_size: usize,

    /// Selectors for the subtrees to translate (`tag`, `#id`, `.class`).
    pub root_selectors: Vec<String>,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Deadline for translating a whole document, in seconds. Must stay
    /// below `timeouts.request_secs` so the fallback page is still sent.
    pub deadline_secs: u64,

    /// Maximum chunks in flight for one document.
    pub max_concurrency: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://translation.googleapis.com/language/translate/v2".to_string(),
            api_key: String::new(),
            source_lang: "en".to_string(),
            max_page_size: 500 * 1024,
            chunk_size: 4 * 1024,
            root_selectors: vec!["body".to_string()],
            timeout_secs: 15,
            deadline_secs: 30,
            max_concurrency: 4,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed until response headers are produced, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
