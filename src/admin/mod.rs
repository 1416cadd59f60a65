//! Admin API: audit trail, analytics summary and limiter state.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/security-events", get(get_security_events))
        .route("/admin/analytics", get(get_analytics))
        .route("/admin/rate-limits", get(get_rate_limits))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
