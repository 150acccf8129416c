//! Cache key derivation.
//!
//! `key = namespace || hex(sha256(method || fullURL(ctx, lang))[..16])`

use sha2::{Digest, Sha256};

use crate::http::request::RequestContext;

/// Key namespaces for one logical resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// URL string, for introspection.
    Href,
    /// Serialized [`ResponseMetadata`](super::metadata::ResponseMetadata).
    Head,
    /// Raw body bytes.
    Page,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Href, Namespace::Head, Namespace::Page];

    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Href => "HREF-",
            Namespace::Head => "HEAD-",
            Namespace::Page => "PAGE-",
        }
    }
}

/// 128-bit hex digest of method and URL.
pub fn digest(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(url.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..16])
}

pub fn cache_key(namespace: Namespace, ctx: &RequestContext, lang: Option<&str>) -> String {
    format!(
        "{}{}",
        namespace.prefix(),
        digest(ctx.method.as_str(), &ctx.full_url(lang))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::http::request::{RequestContextBuilder, RequestSequence, Scheme};
    use axum::http::Request;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn ctx(method: &str, uri: &str) -> RequestContext {
        let (parts, _) = Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "example.com")
            .body(())
            .unwrap()
            .into_parts();
        RequestContextBuilder::new(&UpstreamConfig::default(), Arc::new(RequestSequence::new()))
            .build(&parts, Scheme::Http, "127.0.0.1:1".parse().unwrap())
    }

    #[test]
    fn same_triple_same_key() {
        let a = cache_key(Namespace::Page, &ctx("GET", "/a?x=1"), Some("fr"));
        let b = cache_key(Namespace::Page, &ctx("GET", "/a?x=1"), Some("fr"));
        assert_eq!(a, b);
        assert!(a.starts_with("PAGE-"));
        assert_eq!(a.len(), "PAGE-".len() + 32);
    }

    #[test]
    fn lang_in_query_matches_explicit_lang() {
        // The language parameter never reaches the path, so both spellings
        // address the same variant.
        let from_query = ctx("GET", "/a?lang=fr");
        let plain = ctx("GET", "/a");
        assert_eq!(
            cache_key(Namespace::Head, &from_query, from_query.lang.as_deref()),
            cache_key(Namespace::Head, &plain, Some("fr"))
        );
    }

    #[test]
    fn distinct_triples_do_not_collide() {
        let mut keys = HashSet::new();
        for method in ["GET", "HEAD", "POST"] {
            for uri in ["/", "/a", "/a?b=1", "/b"] {
                for lang in [None, Some("fr"), Some("de")] {
                    assert!(keys.insert(cache_key(Namespace::Page, &ctx(method, uri), lang)));
                }
            }
        }
        assert_eq!(keys.len(), 36);
    }
}
