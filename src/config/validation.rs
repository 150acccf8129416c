//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, IPs and size limits
//! - Check the store settings match the chosen store kind
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use crate::config::schema::{ProxyConfig, StoreKind};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if let Some(tls) = &config.listener.tls {
        if tls.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "listener.tls.bind_address",
                format!("'{}' is not a socket address", tls.bind_address),
            ));
        }
    }

    if config.upstream.proxied_hosts.is_empty() {
        errors.push(ValidationError::new(
            "upstream.proxied_hosts",
            "at least one proxied host is required",
        ));
    }

    for ip in &config.purge.allowed_ips {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                "purge.allowed_ips",
                format!("'{}' is not an IP address", ip),
            ));
        }
    }

    if config.purge.bulk_marker.is_empty() {
        errors.push(ValidationError::new("purge.bulk_marker", "must not be empty"));
    }

    for (i, rule) in config.cache.ttl.iter().enumerate() {
        if rule.match_pattern.is_empty() {
            errors.push(ValidationError::new(
                "cache.ttl",
                format!("rule #{} has an empty match", i),
            ));
        }
    }

    if config.cache.store.kind == StoreKind::Redis && config.cache.store.address.is_empty() {
        errors.push(ValidationError::new(
            "cache.store.address",
            "required for the redis store",
        ));
    }

    let translation = &config.translation;
    if translation.chunk_size == 0 {
        errors.push(ValidationError::new("translation.chunk_size", "must be greater than 0"));
    }
    if translation.max_page_size < translation.chunk_size {
        errors.push(ValidationError::new(
            "translation.max_page_size",
            "must not be smaller than translation.chunk_size",
        ));
    }
    if translation.root_selectors.is_empty() {
        errors.push(ValidationError::new(
            "translation.root_selectors",
            "at least one selector is required",
        ));
    }
    if translation.max_concurrency == 0 {
        errors.push(ValidationError::new(
            "translation.max_concurrency",
            "must be greater than 0",
        ));
    }

    if translation.deadline_secs == 0 {
        errors.push(ValidationError::new(
            "translation.deadline_secs",
            "must be greater than 0",
        ));
    } else if translation.deadline_secs >= config.timeouts.request_secs {
        errors.push(ValidationError::new(
            "translation.deadline_secs",
            format!(
                "must be below timeouts.request_secs ({})",
                config.timeouts.request_secs
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
