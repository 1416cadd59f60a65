use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::GuardError;
use crate::http::request::ClientContext;
use crate::http::server::AppState;
use crate::security::access_control::{bearer_matches, Identity};
use crate::security::audit::{SecurityEvent, SecurityEventKind};

/// Admit callers holding the admin role or the admin API key.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let identity = Identity::from_headers(request.headers());

    if identity.is_admin() || bearer_matches(authorization, &state.config.admin.api_key) {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ClientContext>()
        .cloned()
        .unwrap_or_default();
    state.audit.record(SecurityEvent::new(
        SecurityEventKind::AuthorizationDenied,
        &client,
        json!({
            "role": identity.role.as_str(),
            "userId": identity.user_id,
            "bearer": authorization.is_some(),
        }),
    ));
    GuardError::Forbidden.into_response()
}
