//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard
//! service. All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

use crate::security::rate_limit::RateLimitClass;

/// Root configuration for the guard service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Sliding-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// CSRF token issuance and verification.
    pub csrf: CsrfConfig,

    /// Response headers, body limits and form traps.
    pub security: SecurityConfig,

    /// Spam keyword denylist.
    pub spam: SpamConfig,

    /// Security event audit trail.
    pub audit: AuditConfig,

    /// Analytics ingestion.
    pub analytics: AnalyticsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for a request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// A single sliding-window quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WindowConfig {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Maximum admitted requests per window.
    pub max: u32,
}

impl WindowConfig {
    pub const fn new(window_ms: u64, max: u32) -> Self {
        Self { window_ms, max }
    }
}

/// Quotas per endpoint class.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitPresets {
    pub auth: WindowConfig,
    pub api: WindowConfig,
    pub upload: WindowConfig,
    pub contact: WindowConfig,
    pub newsletter: WindowConfig,
}

impl RateLimitPresets {
    pub fn for_class(&self, class: RateLimitClass) -> WindowConfig {
        match class {
            RateLimitClass::Auth => self.auth,
            RateLimitClass::Api => self.api,
            RateLimitClass::Upload => self.upload,
            RateLimitClass::Contact => self.contact,
            RateLimitClass::Newsletter => self.newsletter,
        }
    }
}

impl Default for RateLimitPresets {
    fn default() -> Self {
        const FIFTEEN_MINUTES: u64 = 15 * 60 * 1000;
        const ONE_HOUR: u64 = 60 * 60 * 1000;
        Self {
            auth: WindowConfig::new(FIFTEEN_MINUTES, 5),
            api: WindowConfig::new(FIFTEEN_MINUTES, 100),
            upload: WindowConfig::new(ONE_HOUR, 10),
            contact: WindowConfig::new(ONE_HOUR, 3),
            newsletter: WindowConfig::new(ONE_HOUR, 5),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Interval of the global sweep that evicts empty records.
    pub sweep_interval_secs: u64,

    /// Key clients by `X-Forwarded-For` instead of the socket peer: the
    /// rightmost address not listed in `trusted_proxies`.
    pub trust_forwarded_for: bool,

    /// Addresses of our own reverse proxies, skipped when reading
    /// `X-Forwarded-For`.
    pub trusted_proxies: Vec<String>,

    /// Per-class quotas.
    pub presets: RateLimitPresets,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 60,
            trust_forwarded_for: false,
            trusted_proxies: Vec::new(),
            presets: RateLimitPresets::default(),
        }
    }
}

/// CSRF configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Require a CSRF token on mutating endpoints.
    pub enabled: bool,

    /// Track issued tokens server-side and bind them to the session.
    /// When false only the token shape is checked, which is a weak defense.
    pub bind_to_session: bool,

    /// Consume a token on first successful use.
    pub single_use: bool,

    /// Token lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_to_session: true,
            single_use: true,
            ttl_secs: 3600,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security response headers.
    pub enable_headers: bool,
    /// Production mode; adds Strict-Transport-Security.
    pub production: bool,
    /// Content-Security-Policy value.
    pub content_security_policy: String,
    /// HSTS max-age in seconds.
    pub hsts_max_age_secs: u64,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Hidden form field that must arrive empty.
    pub honeypot_field: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            production: false,
            content_security_policy: "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; font-src 'self' data:; connect-src 'self'; frame-ancestors 'none'; base-uri 'self'; form-action 'self'".to_string(),
            hsts_max_age_secs: 31_536_000,
            max_body_size: 2 * 1024 * 1024, // 2MB
            honeypot_field: "website".to_string(),
        }
    }
}

/// Spam filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpamConfig {
    /// Case-insensitive substrings that mark a message as spam.
    pub keywords: Vec<String>,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            keywords: [
                "viagra",
                "cialis",
                "lottery",
                "casino",
                "winner",
                "free money",
                "click here",
                "make money fast",
                "bitcoin investment",
                "crypto giveaway",
                "wire transfer",
                "nigerian prince",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        }
    }
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Number of recent events kept in memory for the admin API.
    pub recent_capacity: usize,
    /// Append events as JSON lines to this file.
    pub log_path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 1000,
            log_path: None,
        }
    }
}

/// Analytics ingestion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Accept events. When false every event is dropped.
    pub enabled: bool,
    /// Number of stored events retained by the in-memory sink.
    pub memory_capacity: usize,
    /// Also append accepted events as JSON lines to this file.
    pub log_path: Option<String>,
    /// Distinct page paths, funnels and steps per funnel kept in the
    /// aggregates; the rest are counted under `(other)`.
    pub max_tracked_keys: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_capacity: 10_000,
            log_path: None,
            max_tracked_keys: 1_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API.
    pub enabled: bool,

    /// API key for CLI access (Bearer token).
    pub api_key: String,

    /// Recipient of contact-form and booking notifications.
    pub notify_email: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            notify_email: "owner@localhost".to_string(),
        }
    }
}
