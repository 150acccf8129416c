//! Request admission.
//!
//! Rules, in order:
//! 1. PURGE from an IP outside the purge allow-list is forbidden
//! 2. A host outside the proxied-hosts allow-list is a bad request
//! 3. Everything else is allowed

use std::collections::HashSet;
use std::net::IpAddr;

use async_trait::async_trait;

use crate::config::{PurgeConfig, UpstreamConfig};
use crate::http::error::ProxyError;
use crate::http::is_purge;
use crate::http::pipeline::{Exchange, Outcome, Stage};
use crate::http::request::RequestContext;

/// Admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Forbidden,
    BadRequest(&'static str),
}

/// Upstream and purge allow-lists.
#[derive(Debug, Clone)]
pub struct Firewall {
    proxied_hosts: HashSet<String>,
    purge_ips: HashSet<IpAddr>,
}

impl Firewall {
    pub fn new(upstream: &UpstreamConfig, purge: &PurgeConfig) -> Self {
        let purge_ips = purge
            .allowed_ips
            .iter()
            .filter_map(|ip| match ip.parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    tracing::warn!(ip = %ip, "Ignoring invalid purge allow-list entry");
                    None
                }
            })
            .collect();

        Self {
            proxied_hosts: upstream
                .proxied_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            purge_ips,
        }
    }

    pub fn admit(&self, ctx: &RequestContext) -> Verdict {
        if is_purge(&ctx.method) && !self.purge_ips.contains(&canonical_ip(ctx.remote_ip)) {
            tracing::warn!(request_id = %ctx.id, remote_ip = %ctx.remote_ip, "PURGE rejected");
            return Verdict::Forbidden;
        }

        if !self.proxied_hosts.contains(&ctx.host) {
            tracing::warn!(request_id = %ctx.id, host = %ctx.host, "Host not proxied");
            return Verdict::BadRequest("Not Proxied");
        }

        Verdict::Allow
    }
}

#[async_trait]
impl Stage for Firewall {
    fn name(&self) -> &'static str {
        "firewall"
    }

    async fn run(&self, exchange: &mut Exchange) -> Outcome {
        match self.admit(&exchange.ctx) {
            Verdict::Allow => Outcome::Continue,
            Verdict::Forbidden => Outcome::Fail(ProxyError::PurgeForbidden),
            Verdict::BadRequest(reason) => Outcome::Fail(ProxyError::BadRequest(reason)),
        }
    }
}

/// IPv4-mapped IPv6 peers compare as their IPv4 form.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{RequestContextBuilder, RequestSequence, Scheme};
    use axum::http::Request;
    use std::sync::Arc;

    fn ctx(method: &str, host: &str, peer: &str) -> RequestContext {
        let (parts, _) = Request::builder()
            .method(method)
            .uri("/")
            .header("host", host)
            .body(())
            .unwrap()
            .into_parts();
        RequestContextBuilder::new(&UpstreamConfig::default(), Arc::new(RequestSequence::new()))
            .build(&parts, Scheme::Http, peer.parse().unwrap())
    }

    fn firewall() -> Firewall {
        let upstream = UpstreamConfig {
            proxied_hosts: vec!["Example.com".into()],
            ..UpstreamConfig::default()
        };
        let purge = PurgeConfig {
            allowed_ips: vec!["10.0.0.1".into()],
            ..PurgeConfig::default()
        };
        Firewall::new(&upstream, &purge)
    }

    #[test]
    fn allows_proxied_host() {
        assert_eq!(firewall().admit(&ctx("GET", "example.com", "1.2.3.4:1")), Verdict::Allow);
    }

    #[test]
    fn rejects_unknown_host() {
        assert_eq!(
            firewall().admit(&ctx("GET", "evil.com", "1.2.3.4:1")),
            Verdict::BadRequest("Not Proxied")
        );
    }

    #[test]
    fn purge_requires_allowed_ip_before_host_check() {
        assert_eq!(firewall().admit(&ctx("PURGE", "evil.com", "1.2.3.4:1")), Verdict::Forbidden);
        assert_eq!(firewall().admit(&ctx("PURGE", "example.com", "10.0.0.1:1")), Verdict::Allow);
        assert_eq!(
            firewall().admit(&ctx("PURGE", "example.com", "[::ffff:10.0.0.1]:1")),
            Verdict::Allow
        );
    }
}
