//! Submission gating for mutating endpoints.
//!
//! # Check order
//! ```text
//! CSRF → honeypot → schema → spam → sanitize
//! ```
//! Each failure is terminal and records exactly one security event. A
//! submission that passes every check records `SUBMISSION_ACCEPTED` and is
//! handed on in sanitized form.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{json, Map, Value};

use crate::error::GuardError;
use crate::http::request::ClientContext;
use crate::security::audit::{AuditLog, SecurityEvent, SecurityEventKind};
use crate::security::csrf::CsrfProtection;
use crate::security::sanitize::sanitize_payload;
use crate::security::spam::SpamFilter;
use crate::security::validator::{validate, ValidationSchema};

/// Body field that may carry the CSRF token.
pub const CSRF_BODY_FIELD: &str = "csrfToken";

const MALFORMED_BODY: &str = "request body must be a JSON object";

/// What a given endpoint requires of its submissions.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionPolicy {
    /// Submission kind, as passed to the store and recorded in events.
    pub kind: &'static str,
    pub schema: &'static ValidationSchema,
    /// Free-text field checked against the spam denylist.
    pub spam_field: Option<&'static str>,
}

/// CSRF, honeypot, validation, spam and sanitization in one place.
pub struct RequestGuard {
    csrf: Arc<CsrfProtection>,
    spam: ArcSwap<SpamFilter>,
    honeypot_field: String,
    audit: AuditLog,
}

impl RequestGuard {
    pub fn new(
        csrf: Arc<CsrfProtection>,
        spam: SpamFilter,
        honeypot_field: impl Into<String>,
        audit: AuditLog,
    ) -> Self {
        Self {
            csrf,
            spam: ArcSwap::from_pointee(spam),
            honeypot_field: honeypot_field.into(),
            audit,
        }
    }

    pub fn csrf(&self) -> &Arc<CsrfProtection> {
        &self.csrf
    }

    pub fn spam_filter(&self) -> Arc<SpamFilter> {
        self.spam.load_full()
    }

    pub fn update_spam_filter(&self, filter: SpamFilter) {
        tracing::info!(keywords = filter.len(), "Spam denylist updated");
        self.spam.store(Arc::new(filter));
    }

    /// Decode a raw JSON body and run [`RequestGuard::check`] on it.
    ///
    /// A body that is not a JSON object fails validation, after the header
    /// token has been checked.
    pub fn check_body(
        &self,
        client: &ClientContext,
        csrf_header: Option<&str>,
        body: &[u8],
        policy: &SubmissionPolicy,
    ) -> Result<Map<String, Value>, GuardError> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(payload)) => self.check(client, csrf_header, payload, policy),
            _ => {
                self.verify_csrf(client, csrf_header, policy)?;
                let errors = vec![MALFORMED_BODY.to_string()];
                self.reject(
                    SecurityEventKind::ValidationFailed,
                    client,
                    json!({ "kind": policy.kind, "errors": errors }),
                );
                Err(GuardError::ValidationFailed(errors))
            }
        }
    }

    /// Run every check against `payload` and return it sanitized.
    ///
    /// `csrf_header` is the `X-CSRF-Token` value; when absent the token is
    /// read from the `csrfToken` body field.
    pub fn check(
        &self,
        client: &ClientContext,
        csrf_header: Option<&str>,
        mut payload: Map<String, Value>,
        policy: &SubmissionPolicy,
    ) -> Result<Map<String, Value>, GuardError> {
        let token = csrf_header.or_else(|| payload.get(CSRF_BODY_FIELD).and_then(Value::as_str));
        self.verify_csrf(client, token, policy)?;

        if payload.get(&self.honeypot_field).is_some_and(is_filled) {
            self.reject(
                SecurityEventKind::HoneypotTriggered,
                client,
                json!({ "kind": policy.kind, "field": self.honeypot_field }),
            );
            return Err(GuardError::HoneypotTriggered);
        }

        payload.remove(CSRF_BODY_FIELD);
        payload.remove(&self.honeypot_field);

        let outcome = validate(&payload, policy.schema);
        if !outcome.is_valid {
            self.reject(
                SecurityEventKind::ValidationFailed,
                client,
                json!({
                    "kind": policy.kind,
                    "errors": outcome.errors,
                    "fields": field_names(&payload, policy.schema),
                }),
            );
            return Err(GuardError::ValidationFailed(outcome.errors));
        }

        if let Some(field) = policy.spam_field {
            let filter = self.spam.load();
            let matched = payload
                .get(field)
                .and_then(Value::as_str)
                .and_then(|text| filter.find_match(text));
            if let Some(keyword) = matched {
                self.reject(
                    SecurityEventKind::SpamDetected,
                    client,
                    json!({ "kind": policy.kind, "field": field, "keyword": keyword }),
                );
                return Err(GuardError::SpamDetected);
            }
        }

        let sanitized = sanitize_payload(&payload, policy.schema);
        self.audit.record(SecurityEvent::new(
            SecurityEventKind::SubmissionAccepted,
            client,
            json!({ "kind": policy.kind, "fields": field_names(&sanitized, policy.schema) }),
        ));
        Ok(sanitized)
    }

    fn verify_csrf(
        &self,
        client: &ClientContext,
        token: Option<&str>,
        policy: &SubmissionPolicy,
    ) -> Result<(), GuardError> {
        if !self.csrf.enabled() {
            return Ok(());
        }
        self.csrf.verify(client.session_id.as_deref(), token).map_err(|failure| {
            self.reject(
                SecurityEventKind::CsrfInvalid,
                client,
                json!({ "kind": policy.kind, "reason": failure.as_str() }),
            );
            GuardError::CsrfInvalid(failure)
        })
    }

    fn reject(&self, kind: SecurityEventKind, client: &ClientContext, details: Value) {
        self.audit.record(SecurityEvent::new(kind, client, details));
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Submitted field names, sensitive ones included by name only.
fn field_names(payload: &Map<String, Value>, schema: &ValidationSchema) -> Vec<String> {
    payload
        .keys()
        .filter(|key| schema.rule(key).is_some())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{AuditConfig, CsrfConfig, SpamConfig};
    use crate::security::csrf::CsrfFailure;
    use crate::security::schemas::{CONTACT_FORM, LOGIN, NEWSLETTER_SIGNUP};

    fn contact_policy() -> SubmissionPolicy {
        SubmissionPolicy {
            kind: "contact",
            schema: &CONTACT_FORM,
            spam_field: Some("message"),
        }
    }

    fn guard(csrf: CsrfConfig) -> (RequestGuard, AuditLog) {
        let clock = ManualClock::new(1_700_000_000_000);
        let audit = AuditLog::new(&AuditConfig::default());
        let guard = RequestGuard::new(
            Arc::new(CsrfProtection::new(csrf, Arc::new(clock))),
            SpamFilter::from_config(&SpamConfig::default()),
            "website",
            audit.clone(),
        );
        (guard, audit)
    }

    fn client() -> ClientContext {
        ClientContext {
            ip: "203.0.113.7".into(),
            session_id: Some("session-1".into()),
            path: "/api/contact".into(),
            ..ClientContext::default()
        }
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn contact(message: &str) -> Map<String, Value> {
        payload(json!({
            "name": "Grace Hopper",
            "email": "grace@example.com",
            "message": message,
        }))
    }

    fn shape_only() -> CsrfConfig {
        CsrfConfig {
            bind_to_session: false,
            ..CsrfConfig::default()
        }
    }

    #[test]
    fn test_missing_csrf_rejected_first() {
        let (guard, audit) = guard(CsrfConfig::default());
        let mut body = contact("hello there, friend");
        body.insert("website".into(), json!("http://spam.example"));

        let err = guard.check(&client(), None, body, &contact_policy()).unwrap_err();
        assert_eq!(err, GuardError::CsrfInvalid(CsrfFailure::Missing));
        let events = audit.recent(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SecurityEventKind::CsrfInvalid);
    }

    #[test]
    fn test_bound_token_from_body_accepted_once() {
        let (guard, _) = guard(CsrfConfig::default());
        let grant = guard.csrf().issue("session-1");

        let mut body = contact("Do you ship chamomile abroad?");
        body.insert(CSRF_BODY_FIELD.into(), json!(grant.token));
        let sanitized = guard.check(&client(), None, body.clone(), &contact_policy()).unwrap();
        assert!(!sanitized.contains_key(CSRF_BODY_FIELD));

        let err = guard.check(&client(), None, body, &contact_policy()).unwrap_err();
        assert_eq!(err, GuardError::CsrfInvalid(CsrfFailure::Unknown));
    }

    #[test]
    fn test_header_token_for_other_session_rejected() {
        let (guard, _) = guard(CsrfConfig::default());
        let grant = guard.csrf().issue("someone-else");
        let err = guard
            .check(&client(), Some(&grant.token), contact("a perfectly fine note"), &contact_policy())
            .unwrap_err();
        assert_eq!(err, GuardError::CsrfInvalid(CsrfFailure::SessionMismatch));
    }

    #[test]
    fn test_honeypot_rejected_regardless_of_fields() {
        let (guard, audit) = guard(shape_only());
        let token = crate::security::csrf::generate_token();
        let mut body = contact("A genuine question about elderflower");
        body.insert("website".into(), json!("x"));

        let err = guard.check(&client(), Some(&token), body, &contact_policy()).unwrap_err();
        assert_eq!(err, GuardError::HoneypotTriggered);
        assert_eq!(audit.recent(1)[0].kind, SecurityEventKind::HoneypotTriggered);
    }

    #[test]
    fn test_empty_honeypot_passes() {
        let (guard, _) = guard(shape_only());
        let token = crate::security::csrf::generate_token();
        let mut body = contact("A genuine question about elderflower");
        body.insert("website".into(), json!(""));
        let sanitized = guard.check(&client(), Some(&token), body, &contact_policy()).unwrap();
        assert!(!sanitized.contains_key("website"));
    }

    #[test]
    fn test_spam_message_rejected() {
        let (guard, audit) = guard(shape_only());
        let token = crate::security::csrf::generate_token();
        let err = guard
            .check(
                &client(),
                Some(&token),
                contact("You are a WINNER! Claim your FREE MONEY now!"),
                &contact_policy(),
            )
            .unwrap_err();
        assert_eq!(err, GuardError::SpamDetected);
        assert_eq!(err.kind(), "spam_filter");
        let events = audit.recent(1);
        let event = &events[0];
        assert_eq!(event.kind, SecurityEventKind::SpamDetected);
        assert_eq!(event.details["keyword"], "winner");
    }

    #[test]
    fn test_spam_filter_hot_swap() {
        let (guard, _) = guard(shape_only());
        let token = crate::security::csrf::generate_token();
        guard.update_spam_filter(SpamFilter::new(["elderflower"]));
        let err = guard
            .check(&client(), Some(&token), contact("Is elderflower in stock?"), &contact_policy())
            .unwrap_err();
        assert_eq!(err, GuardError::SpamDetected);
    }

    #[test]
    fn test_invalid_newsletter_never_sanitized() {
        let (guard, audit) = guard(shape_only());
        let token = crate::security::csrf::generate_token();
        let policy = SubmissionPolicy {
            kind: "newsletter",
            schema: &NEWSLETTER_SIGNUP,
            spam_field: None,
        };
        let err = guard
            .check(&client(), Some(&token), payload(json!({ "email": "not-an-email" })), &policy)
            .unwrap_err();
        assert_eq!(
            err,
            GuardError::ValidationFailed(vec!["email must be a valid email address".into()])
        );
        let kinds: Vec<_> = audit.recent(10).into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![SecurityEventKind::ValidationFailed]);
    }

    #[test]
    fn test_accepted_payload_sanitized_without_leaking_password() {
        let (guard, audit) = guard(shape_only());
        let token = crate::security::csrf::generate_token();
        let policy = SubmissionPolicy {
            kind: "login",
            schema: &LOGIN,
            spam_field: None,
        };
        let body = payload(json!({
            "email": "ada@example.com",
            "password": "s3cret';--",
            "note": "Robert'); DROP TABLE users; --",
        }));
        let sanitized = guard.check(&client(), Some(&token), body, &policy).unwrap();
        assert_eq!(sanitized["password"], "s3cret';--");
        assert_eq!(sanitized["note"], "Robert) TABLE users");

        let events = audit.recent(1);
        let event = &events[0];
        assert_eq!(event.kind, SecurityEventKind::SubmissionAccepted);
        assert!(!event.details.to_string().contains("s3cret"));
    }

    #[test]
    fn test_whitespace_honeypot_rejected() {
        let (guard, _) = guard(shape_only());
        let token = crate::security::csrf::generate_token();
        let mut body = contact("A genuine question about elderflower");
        body.insert("website".into(), json!("   "));

        let err = guard.check(&client(), Some(&token), body, &contact_policy()).unwrap_err();
        assert_eq!(err, GuardError::HoneypotTriggered);
    }

    #[test]
    fn test_non_object_body_checks_csrf_first() {
        let (guard, audit) = guard(CsrfConfig::default());
        let err = guard
            .check_body(&client(), None, b"not json at all", &contact_policy())
            .unwrap_err();
        assert_eq!(err, GuardError::CsrfInvalid(CsrfFailure::Missing));
        assert_eq!(audit.recent(1)[0].kind, SecurityEventKind::CsrfInvalid);
    }

    #[test]
    fn test_non_object_body_fails_validation() {
        let (guard, audit) = guard(shape_only());
        let token = crate::security::csrf::generate_token();
        let err = guard
            .check_body(&client(), Some(&token), b"[1, 2, 3]", &contact_policy())
            .unwrap_err();
        assert_eq!(err, GuardError::ValidationFailed(vec![MALFORMED_BODY.into()]));
        assert_eq!(audit.recent(1)[0].kind, SecurityEventKind::ValidationFailed);
    }

    #[test]
    fn test_disabled_csrf_skips_token_check() {
        let (guard, _) = guard(CsrfConfig {
            enabled: false,
            ..CsrfConfig::default()
        });
        assert!(guard
            .check(&client(), None, contact("Hello, is the shop open?"), &contact_policy())
            .is_ok());
    }
}
