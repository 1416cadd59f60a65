//! External collaborators consumed after a submission passes the guard.
//!
//! Persistence and mail delivery belong to the host application. The
//! defaults shipped here only log, which keeps the service runnable on its
//! own and makes the hand-off visible in the request trace.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("mail error: {0}")]
    Mail(String),
}

/// Persists sanitized submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Store `payload` under `kind` and return its id.
    async fn store(&self, kind: &str, payload: &Map<String, Value>) -> Result<String, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailRequest {
    pub recipient: String,
    pub template: &'static str,
    pub data: Value,
}

/// Sends notification mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn notify(&self, request: MailRequest) -> Result<(), CollaboratorError>;
}

/// Logs the submission and assigns a fresh id.
#[derive(Debug, Default)]
pub struct LoggingSubmissionStore;

#[async_trait]
impl SubmissionStore for LoggingSubmissionStore {
    async fn store(&self, kind: &str, payload: &Map<String, Value>) -> Result<String, CollaboratorError> {
        let id = uuid::Uuid::new_v4().to_string();
        let fields: Vec<&str> = payload.keys().map(String::as_str).collect();
        tracing::info!(kind, id = %id, ?fields, "Submission stored");
        Ok(id)
    }
}

#[derive(Debug, Default)]
pub struct LoggingMailer;

#[async_trait]
impl Mailer for LoggingMailer {
    async fn notify(&self, request: MailRequest) -> Result<(), CollaboratorError> {
        tracing::info!(recipient = %request.recipient, template = request.template, "Mail queued");
        Ok(())
    }
}
