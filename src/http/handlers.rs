//! Public route handlers.
//!
//! Every mutating handler runs the same sequence: guard the body, hand the
//! sanitized payload to the submission store, then queue mail. Rate limiting
//! has already happened in the route's middleware.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::collaborators::{CollaboratorError, MailRequest};
use crate::error::GuardError;
use crate::http::request::{ClientContext, X_CSRF_TOKEN, X_SESSION_ID};
use crate::http::response::{ingest_ack, Accepted};
use crate::http::server::AppState;
use crate::security::audit::{SecurityEvent, SecurityEventKind};
use crate::security::schemas;
use crate::security::SubmissionPolicy;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Issue a CSRF token for the caller's session, creating a session id when
/// the caller has none.
pub async fn csrf_token(State(state): State<AppState>, client: ClientContext) -> Response {
    let session_id = client
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let grant = state.guard.csrf().issue(&session_id);

    let mut response = Json(json!({
        "success": true,
        "csrfToken": grant.token,
        "sessionId": grant.session_id,
        "expiresAt": grant.expires_at_ms,
    }))
    .into_response();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(X_SESSION_ID, value);
    }
    response
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Accepted, GuardError> {
    let policy = SubmissionPolicy {
        kind: "login",
        schema: &schemas::LOGIN,
        spam_field: None,
    };
    state.guard.check_body(&client, csrf_header(&headers), &body, &policy)?;
    // Credentials go to the identity provider, never to the submission store.
    Ok(Accepted::new("Login request accepted"))
}

pub async fn register(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Accepted, GuardError> {
    let policy = SubmissionPolicy {
        kind: "registration",
        schema: &schemas::REGISTRATION,
        spam_field: None,
    };
    let (payload, id) = submit(&state, &client, &headers, &body, policy).await?;
    if let Some(email) = field(&payload, "email") {
        notify(&state, email, "welcome", json!({ "name": field(&payload, "name") })).await;
    }
    Ok(Accepted::new("Registration received").with_id(id))
}

pub async fn contact(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Accepted, GuardError> {
    let policy = SubmissionPolicy {
        kind: "contact",
        schema: &schemas::CONTACT_FORM,
        spam_field: Some("message"),
    };
    let (payload, id) = submit(&state, &client, &headers, &body, policy).await?;
    let owner = state.config.admin.notify_email.clone();
    notify(&state, &owner, "contact_notification", Value::Object(payload)).await;
    Ok(Accepted::new("Thank you for your message. We will get back to you soon.").with_id(id))
}

pub async fn newsletter(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Accepted, GuardError> {
    let policy = SubmissionPolicy {
        kind: "newsletter",
        schema: &schemas::NEWSLETTER_SIGNUP,
        spam_field: None,
    };
    let (payload, id) = submit(&state, &client, &headers, &body, policy).await?;
    if let Some(email) = field(&payload, "email") {
        notify(&state, email, "newsletter_welcome", json!({ "name": field(&payload, "name") })).await;
    }
    Ok(Accepted::new("Successfully subscribed to the newsletter").with_id(id))
}

pub async fn appointment(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Accepted, GuardError> {
    let policy = SubmissionPolicy {
        kind: "appointment",
        schema: &schemas::APPOINTMENT_BOOKING,
        spam_field: Some("notes"),
    };
    let (payload, id) = submit(&state, &client, &headers, &body, policy).await?;
    let data = json!({
        "appointmentId": id,
        "serviceType": field(&payload, "serviceType"),
        "preferredDate": field(&payload, "preferredDate"),
    });
    if let Some(email) = field(&payload, "email") {
        notify(&state, email, "appointment_confirmation", data.clone()).await;
    }
    let owner = state.config.admin.notify_email.clone();
    notify(&state, &owner, "appointment_notification", data).await;
    Ok(Accepted::new("Appointment request received").with_id(id))
}

pub async fn upload(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Accepted, GuardError> {
    let policy = SubmissionPolicy {
        kind: "upload",
        schema: &schemas::UPLOAD_METADATA,
        spam_field: None,
    };
    let (_, id) = submit(&state, &client, &headers, &body, policy).await?;
    Ok(Accepted::new("Upload accepted").with_id(id))
}

/// Open telemetry sink: always `200 { success: true }`.
pub async fn ingest_event(State(state): State<AppState>, body: Bytes) -> Response {
    state.analytics.ingest_bytes(&body);
    ingest_ack()
}

/// Fallback for unmatched routes.
pub async fn not_found() -> Response {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Not found", "type": "not_found" })),
    )
        .into_response()
}

fn csrf_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_CSRF_TOKEN).and_then(|v| v.to_str().ok())
}

fn field<'a>(payload: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    payload.get(name).and_then(Value::as_str)
}

/// Guard the body and store the result with sensitive fields removed.
async fn submit(
    state: &AppState,
    client: &ClientContext,
    headers: &HeaderMap,
    body: &[u8],
    policy: SubmissionPolicy,
) -> Result<(Map<String, Value>, String), GuardError> {
    let payload = state.guard.check_body(client, csrf_header(headers), body, &policy)?;

    let stored: Map<String, Value> = payload
        .iter()
        .filter(|(key, _)| !policy.schema.is_sensitive(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    match state.store.store(policy.kind, &stored).await {
        Ok(id) => Ok((stored, id)),
        Err(e) => Err(internal_error(state, client, policy.kind, e)),
    }
}

fn internal_error(state: &AppState, client: &ClientContext, kind: &str, error: CollaboratorError) -> GuardError {
    state.audit.record(SecurityEvent::new(
        SecurityEventKind::InternalError,
        client,
        json!({ "kind": kind, "stage": "store" }),
    ));
    GuardError::Internal(error.to_string())
}

/// Mail is best effort; failures are logged only.
async fn notify(state: &AppState, recipient: &str, template: &'static str, data: Value) {
    let request = MailRequest {
        recipient: recipient.to_string(),
        template,
        data,
    };
    if let Err(e) = state.mailer.notify(request).await {
        tracing::error!(template, error = %e, "Failed to send notification");
    }
}
