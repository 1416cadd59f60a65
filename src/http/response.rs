//! Success response shapes.
//!
//! Rejections are rendered by [`crate::error::GuardError`]; everything a
//! handler returns on success goes through here so clients always see
//! `{ "success": true, ... }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Accepted {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Accepted {
    pub fn new(message: &'static str) -> Self {
        Self {
            success: true,
            message,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl IntoResponse for Accepted {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Body of the analytics ingest endpoint, whatever happened to the event.
pub fn ingest_ack() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
}
