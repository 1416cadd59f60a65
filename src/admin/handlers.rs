use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsSummary;
use crate::config::RateLimitPresets;
use crate::http::server::AppState;
use crate::security::audit::SecurityEvent;
use std::collections::BTreeMap;

/// Upper bound on `?limit=` for the event listing.
pub const MAX_EVENT_LIMIT: usize = 1000;
const DEFAULT_EVENT_LIMIT: usize = 50;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub security_events: usize,
    pub csrf_tokens_outstanding: usize,
    pub rate_limit_keys: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        security_events: state.audit.len(),
        csrf_tokens_outstanding: state.guard.csrf().outstanding(),
        rate_limit_keys: state.rate_limiter.limiter().tracked_keys(),
    })
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventsResponse {
    pub counts: BTreeMap<&'static str, usize>,
    pub events: Vec<SecurityEvent>,
}

pub async fn get_security_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<SecurityEventsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
    Json(SecurityEventsResponse {
        counts: state.audit.counts_by_kind(),
        events: state.audit.recent(limit),
    })
}

pub async fn get_analytics(State(state): State<AppState>) -> Json<AnalyticsSummary> {
    Json(state.analytics.summary())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub tracked_keys: usize,
    pub presets: RateLimitPresets,
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Json<RateLimitStatus> {
    let limiter = &state.rate_limiter;
    Json(RateLimitStatus {
        enabled: limiter.enabled(),
        tracked_keys: limiter.limiter().tracked_keys(),
        presets: limiter.presets().as_ref().clone(),
    })
}
