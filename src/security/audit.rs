//! Security event audit trail.
//!
//! Every rejection and every accepted sensitive submission produces one
//! [`SecurityEvent`]. Recording is infallible from the caller's point of view:
//! the event goes to the tracing pipeline, a bounded in-memory ring for the
//! admin API, and optionally a JSON-lines file written off the request path.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::http::request::ClientContext;
use crate::observability::jsonl::JsonLinesWriter;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    RateLimitExceeded,
    CsrfInvalid,
    HoneypotTriggered,
    ValidationFailed,
    #[serde(rename = "SPAM_FILTER")]
    SpamDetected,
    SubmissionAccepted,
    AuthorizationDenied,
    InternalError,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            SecurityEventKind::CsrfInvalid => "CSRF_INVALID",
            SecurityEventKind::HoneypotTriggered => "HONEYPOT_TRIGGERED",
            SecurityEventKind::ValidationFailed => "VALIDATION_FAILED",
            SecurityEventKind::SpamDetected => "SPAM_FILTER",
            SecurityEventKind::SubmissionAccepted => "SUBMISSION_ACCEPTED",
            SecurityEventKind::AuthorizationDenied => "AUTHORIZATION_DENIED",
            SecurityEventKind::InternalError => "INTERNAL_ERROR",
        }
    }

    fn is_rejection(&self) -> bool {
        !matches!(self, SecurityEventKind::SubmissionAccepted)
    }
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: SecurityEventKind,
    pub ip: String,
    pub user_agent: String,
    pub request_id: Option<String>,
    pub path: String,
    pub details: Value,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, client: &ClientContext, details: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            request_id: client.request_id.clone(),
            path: client.path.clone(),
            details,
        }
    }
}

struct AuditInner {
    recent: Mutex<VecDeque<SecurityEvent>>,
    capacity: usize,
    writer: Option<JsonLinesWriter<SecurityEvent>>,
}

/// Cheaply cloneable handle to the audit trail.
#[derive(Clone)]
pub struct AuditLog {
    inner: Arc<AuditInner>,
}

impl AuditLog {
    pub fn new(config: &AuditConfig) -> Self {
        let writer = config
            .log_path
            .as_ref()
            .and_then(|path| JsonLinesWriter::spawn(path, "audit"));

        Self {
            inner: Arc::new(AuditInner {
                recent: Mutex::new(VecDeque::with_capacity(config.recent_capacity.min(1024))),
                capacity: config.recent_capacity.max(1),
                writer,
            }),
        }
    }

    /// Record an event. Never fails and never waits on I/O.
    pub fn record(&self, event: SecurityEvent) {
        if event.kind.is_rejection() {
            tracing::warn!(
                kind = event.kind.as_str(),
                ip = %event.ip,
                user_agent = %event.user_agent,
                path = %event.path,
                request_id = ?event.request_id,
                details = %event.details,
                "Security event"
            );
        } else {
            tracing::info!(
                kind = event.kind.as_str(),
                ip = %event.ip,
                path = %event.path,
                request_id = ?event.request_id,
                "Security event"
            );
        }
        metrics::record_security_event(event.kind.as_str());

        if let Some(writer) = &self.inner.writer {
            writer.send(event.clone());
        }

        let mut recent = self.lock_recent();
        if recent.len() >= self.inner.capacity {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<SecurityEvent> {
        self.lock_recent().iter().rev().take(limit).cloned().collect()
    }

    /// Event counts by kind over the retained window.
    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for event in self.lock_recent().iter() {
            *counts.entry(event.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.lock_recent().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave the ring inconsistent.
    fn lock_recent(&self) -> MutexGuard<'_, VecDeque<SecurityEvent>> {
        self.inner
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
