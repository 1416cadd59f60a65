//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! Every problem is reported, not just the first.

use std::net::{IpAddr, SocketAddr};

use regex::Regex;

use crate::config::schema::{GuardConfig, WindowConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let presets = &config.rate_limit.presets;
    for (name, window) in [
        ("auth", presets.auth),
        ("api", presets.api),
        ("upload", presets.upload),
        ("contact", presets.contact),
        ("newsletter", presets.newsletter),
    ] {
        check_window(&mut errors, name, window);
    }

    for (i, proxy) in config.rate_limit.trusted_proxies.iter().enumerate() {
        if proxy.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                format!("rate_limit.trusted_proxies[{}]", i),
                format!("'{}' is not an IP address", proxy),
            ));
        }
    }

    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than 0",
        ));
    }

    if config.csrf.ttl_secs == 0 {
        errors.push(ValidationError::new("csrf.ttl_secs", "must be greater than 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.security.honeypot_field.trim().is_empty() {
        errors.push(ValidationError::new("security.honeypot_field", "must not be empty"));
    } else if !Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .map(|re| re.is_match(&config.security.honeypot_field))
        .unwrap_or(false)
    {
        errors.push(ValidationError::new(
            "security.honeypot_field",
            "must be a plain identifier",
        ));
    }

    if config.security.content_security_policy.trim().is_empty() {
        errors.push(ValidationError::new(
            "security.content_security_policy",
            "must not be empty",
        ));
    }

    for (i, keyword) in config.spam.keywords.iter().enumerate() {
        if keyword.trim().is_empty() {
            errors.push(ValidationError::new(format!("spam.keywords[{}]", i), "must not be empty"));
        }
    }

    if config.audit.recent_capacity == 0 {
        errors.push(ValidationError::new("audit.recent_capacity", "must be greater than 0"));
    }

    if config.analytics.memory_capacity == 0 {
        errors.push(ValidationError::new(
            "analytics.memory_capacity",
            "must be greater than 0",
        ));
    }

    if config.analytics.max_tracked_keys == 0 {
        errors.push(ValidationError::new(
            "analytics.max_tracked_keys",
            "must be greater than 0",
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

    if config.admin.enabled && config.admin.api_key.len() < 16 {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be at least 16 characters",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_window(errors: &mut Vec<ValidationError>, name: &str, window: WindowConfig) {
    if window.window_ms == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.presets.{}.window_ms", name),
            "must be greater than 0",
        ));
    }
    if window.max == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.presets.{}.max", name),
            "must be greater than 0",
        ));
    }
}
