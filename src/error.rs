//! Rejection taxonomy for the gating layer and its HTTP mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::security::csrf::CsrfFailure;

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("Too many requests, please try again later")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Invalid or missing CSRF token")]
    CsrfInvalid(CsrfFailure),

    #[error("Submission rejected")]
    HoneypotTriggered,

    #[error("Validation failed")]
    ValidationFailed(Vec<String>),

    #[error("Message rejected by spam filter")]
    SpamDetected,

    #[error("Access denied")]
    Forbidden,

    /// The detail is logged, never sent to the client.
    #[error("An unexpected error occurred")]
    Internal(String),
}

impl GuardError {
    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GuardError::CsrfInvalid(_)
            | GuardError::HoneypotTriggered
            | GuardError::ValidationFailed(_)
            | GuardError::SpamDetected => StatusCode::BAD_REQUEST,
            GuardError::Forbidden => StatusCode::FORBIDDEN,
            GuardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable rejection type.
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::RateLimitExceeded { .. } => "rate_limit",
            GuardError::CsrfInvalid(_) => "csrf",
            GuardError::HoneypotTriggered => "honeypot",
            GuardError::ValidationFailed(_) => "validation",
            GuardError::SpamDetected => "spam_filter",
            GuardError::Forbidden => "forbidden",
            GuardError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        if let GuardError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "Internal error while handling request");
        }
        crate::observability::metrics::record_rejection(self.kind());

        let mut body = json!({
            "success": false,
            "error": self.to_string(),
            "type": self.kind(),
        });
        if let GuardError::ValidationFailed(errors) = &self {
            body["errors"] = json!(errors);
        }

        let mut response = (self.status(), Json(body)).into_response();
        if let GuardError::RateLimitExceeded { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GuardError::RateLimitExceeded { retry_after_secs: 1 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(GuardError::SpamDetected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(GuardError::HoneypotTriggered.status(), StatusCode::BAD_REQUEST);
        assert_eq!(GuardError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            GuardError::Internal("db down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_detail_not_exposed() {
        let response = GuardError::Internal("SELECT * FROM users failed".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("SELECT"));
        assert!(text.contains("\"type\":\"internal\""));
    }

    #[tokio::test]
    async fn test_validation_body_lists_errors() {
        let response =
            GuardError::ValidationFailed(vec!["email is required".into()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["type"], "validation");
        assert_eq!(body["errors"][0], "email is required");
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = GuardError::RateLimitExceeded { retry_after_secs: 30 }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }
}
