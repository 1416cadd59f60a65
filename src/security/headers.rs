//! Security response headers.
//!
//! Attached to every response by the outermost router layers, including
//! 404s and rejections produced by inner middleware.

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::SecurityConfig;

pub const PERMISSIONS_POLICY: &str =
    "geolocation=(), camera=(), microphone=(), payment=(), usb=(), accelerometer=(), gyroscope=(), magnetometer=()";

const X_XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");
const PERMISSIONS_POLICY_HEADER: HeaderName = HeaderName::from_static("permissions-policy");

/// Header set for the given configuration.
pub fn security_headers(config: &SecurityConfig) -> Vec<(HeaderName, HeaderValue)> {
    let mut headers = vec![
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
        (
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ),
        (PERMISSIONS_POLICY_HEADER, HeaderValue::from_static(PERMISSIONS_POLICY)),
    ];

    match HeaderValue::from_str(&config.content_security_policy) {
        Ok(csp) => headers.push((header::CONTENT_SECURITY_POLICY, csp)),
        Err(e) => tracing::error!(error = %e, "Invalid Content-Security-Policy, header omitted"),
    }

    if config.production {
        let hsts = format!("max-age={}; includeSubDomains; preload", config.hsts_max_age_secs);
        if let Ok(value) = HeaderValue::from_str(&hsts) {
            headers.push((header::STRICT_TRANSPORT_SECURITY, value));
        }
    }

    headers
}

/// Layer the security headers onto `router`.
pub fn apply_security_headers<S>(mut router: Router<S>, config: &SecurityConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if !config.enable_headers {
        return router;
    }
    for (name, value) in security_headers(config) {
        router = router.layer(SetResponseHeaderLayer::overriding(name, value));
    }
    router
}
