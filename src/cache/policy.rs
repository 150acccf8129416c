//! Cacheability, bypass and TTL rules.

use std::time::Duration;

use axum::http::Method;

use crate::cache::metadata::ResponseMetadata;
use crate::config::{CacheConfig, TtlRule};
use crate::http::request::RequestContext;

/// Used when no TTL table is configured at all.
pub const DEFAULT_TTL_SECS: u64 = 3600;

const DEFAULT_RULE: &str = "default";
const CACHEABLE_STATUSES: [u16; 2] = [200, 404];

#[derive(Debug, Clone)]
pub struct CachePolicy {
    enabled: bool,
    skip_urls: Vec<String>,
    skip_cookies: Vec<String>,
    ttl: Vec<TtlRule>,
    short_ttl: u64,
    short_ttl_statuses: Vec<u16>,
}

impl CachePolicy {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            skip_urls: config.skip_urls.clone(),
            skip_cookies: config.skip_cookies.clone(),
            ttl: config.ttl.clone(),
            short_ttl: config.short_ttl_secs,
            short_ttl_statuses: config.short_ttl_statuses.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Only GET/HEAD responses with status 200 or 404 are stored.
    pub fn is_cacheable(&self, ctx: &RequestContext, metadata: &ResponseMetadata) -> bool {
        (ctx.method == Method::GET || ctx.method == Method::HEAD)
            && CACHEABLE_STATUSES.contains(&metadata.status_code)
    }

    /// True when the URL or the request cookies match a bypass entry.
    pub fn should_skip(&self, ctx: &RequestContext) -> bool {
        if self.skip_urls.iter().any(|s| ctx.href.contains(s.as_str())) {
            return true;
        }
        let cookies: Vec<&str> = ctx
            .headers
            .get_all("cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        self.skip_cookies
            .iter()
            .any(|s| cookies.iter().any(|c| c.contains(s.as_str())))
    }

    pub fn ttl(&self, metadata: &ResponseMetadata) -> Duration {
        Duration::from_secs(self.ttl_secs(metadata))
    }

    fn ttl_secs(&self, metadata: &ResponseMetadata) -> u64 {
        if self.short_ttl_statuses.contains(&metadata.status_code) {
            return self.short_ttl;
        }
        if self.ttl.is_empty() {
            return DEFAULT_TTL_SECS;
        }

        let content_type = metadata.content_type().unwrap_or("").to_ascii_lowercase();
        self.ttl
            .iter()
            .filter(|rule| rule.match_pattern != DEFAULT_RULE)
            .find(|rule| content_type.starts_with(&rule.match_pattern.to_ascii_lowercase()))
            .or_else(|| self.ttl.iter().find(|rule| rule.match_pattern == DEFAULT_RULE))
            .map(|rule| rule.seconds)
            .unwrap_or(DEFAULT_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::http::request::{RequestContextBuilder, RequestSequence, Scheme};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;

    fn ctx_with(method: &str, uri: &str, cookie: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().method(method).uri(uri).header("host", "example.com");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        RequestContextBuilder::new(&UpstreamConfig::default(), Arc::new(RequestSequence::new()))
            .build(&parts, Scheme::Http, "127.0.0.1:1".parse().unwrap())
    }

    fn meta(status: u16, content_type: Option<&str>) -> ResponseMetadata {
        let mut m = ResponseMetadata::new(StatusCode::from_u16(status).unwrap(), "http://example.com/");
        if let Some(ct) = content_type {
            m.set_header("content-type", ct);
        }
        m
    }

    fn policy() -> CachePolicy {
        let config = CacheConfig {
            skip_urls: vec!["/admin".into()],
            skip_cookies: vec!["session=".into()],
            ttl: vec![TtlRule::new("default", 77), TtlRule::new("text/html", 300)],
            short_ttl_secs: 5,
            ..CacheConfig::default()
        };
        CachePolicy::new(&config)
    }

    #[test]
    fn cacheable_matrix() {
        let p = policy();
        for method in ["GET", "HEAD"] {
            for status in [200, 404] {
                assert!(p.is_cacheable(&ctx_with(method, "/", None), &meta(status, None)));
            }
            for status in [301, 302, 304, 307, 400, 403, 500, 503] {
                assert!(!p.is_cacheable(&ctx_with(method, "/", None), &meta(status, None)));
            }
        }
        for method in ["POST", "PUT", "DELETE", "PURGE"] {
            assert!(!p.is_cacheable(&ctx_with(method, "/", None), &meta(200, None)));
        }
    }

    #[test]
    fn skip_by_url_or_cookie() {
        let p = policy();
        assert!(p.should_skip(&ctx_with("GET", "/admin/x", None)));
        assert!(p.should_skip(&ctx_with("GET", "/", Some("a=1; session=abc"))));
        assert!(!p.should_skip(&ctx_with("GET", "/", Some("a=1"))));
    }

    #[test]
    fn ttl_by_content_type_then_default() {
        let p = policy();
        assert_eq!(p.ttl(&meta(200, Some("text/html; charset=utf-8"))).as_secs(), 300);
        assert_eq!(p.ttl(&meta(200, Some("image/png"))).as_secs(), 77);
        assert_eq!(p.ttl(&meta(404, None)).as_secs(), 77);
    }

    #[test]
    fn volatile_statuses_get_short_ttl() {
        let p = policy();
        for status in [302, 307, 500, 503] {
            assert_eq!(p.ttl(&meta(status, Some("text/html"))).as_secs(), 5);
        }
    }

    #[test]
    fn hard_coded_default_without_table() {
        let config = CacheConfig {
            ttl: Vec::new(),
            ..CacheConfig::default()
        };
        let p = CachePolicy::new(&config);
        assert_eq!(p.ttl(&meta(200, Some("text/html"))).as_secs(), DEFAULT_TTL_SECS);

        let config = CacheConfig {
            ttl: vec![TtlRule::new("text/css", 10)],
            ..CacheConfig::default()
        };
        let p = CachePolicy::new(&config);
        assert_eq!(p.ttl(&meta(200, Some("text/html"))).as_secs(), DEFAULT_TTL_SECS);
    }
}
