//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and relations
//! between fields. All errors are collected, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if !matches!(
        config.environment.to_ascii_lowercase().as_str(),
        "development" | "production"
    ) {
        errors.push(ValidationError::new(
            "environment",
            "must be 'development' or 'production'",
        ));
    }

    if config.database.max_connections == 0 {
        errors.push(ValidationError::new("database.max_connections", "must be > 0"));
    }

    let session = &config.session;
    if session.idle_timeout_secs == 0 {
        errors.push(ValidationError::new("session.idle_timeout_secs", "must be > 0"));
    }
    if session.absolute_timeout_secs < session.idle_timeout_secs {
        errors.push(ValidationError::new(
            "session.absolute_timeout_secs",
            "must be >= session.idle_timeout_secs",
        ));
    }
    if session.cookie_name.is_empty() {
        errors.push(ValidationError::new("session.cookie_name", "must not be empty"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.requests_per_minute == 0 {
            errors.push(ValidationError::new("rate_limit.requests_per_minute", "must be > 0"));
        }
        if config.rate_limit.burst_size == 0 {
            errors.push(ValidationError::new("rate_limit.burst_size", "must be > 0"));
        }
    }

    if config.cache.enabled && config.cache.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.ttl_secs", "must be > 0"));
    }

    if config.csrf.token_ttl_secs == 0 {
        errors.push(ValidationError::new("csrf.token_ttl_secs", "must be > 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    let intervals = [
        ("session.sweep_interval_secs", session.sweep_interval_secs),
        ("rate_limit.sweep_interval_secs", config.rate_limit.sweep_interval_secs),
        ("cache.sweep_interval_secs", config.cache.sweep_interval_secs),
        ("csrf.sweep_interval_secs", config.csrf.sweep_interval_secs),
    ];
    for (field, secs) in intervals {
        if secs == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
