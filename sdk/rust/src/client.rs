use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::tracker::TrackedEvent;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("guard returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfToken {
    pub csrf_token: String,
    pub session_id: String,
    pub expires_at: u64,
}

/// Outcome of a form submission, accepted or not.
#[derive(Debug, Clone)]
pub struct Submission {
    pub status: StatusCode,
    pub rate_limit_limit: Option<u32>,
    pub rate_limit_remaining: Option<u32>,
    pub retry_after_secs: Option<u64>,
    pub body: Value,
}

impl Submission {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Rejection type (`rate_limit`, `csrf`, `validation`, ...).
    pub fn rejection_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }
}

pub struct GuardClient {
    client: Client,
    base_url: String,
    session_id: Option<String>,
}

impl GuardClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Fetch a CSRF token, adopting the session the server bound it to.
    pub async fn fetch_csrf_token(&mut self) -> Result<CsrfToken, SdkError> {
        let mut request = self.client.get(format!("{}/api/csrf-token", self.base_url));
        if let Some(session) = &self.session_id {
            request = request.header("x-session-id", session);
        }
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SdkError::Status { status, body });
        }
        let token: CsrfToken = resp.json().await?;
        self.session_id = Some(token.session_id.clone());
        Ok(token)
    }

    /// POST a JSON form to `path`, carrying the session and `csrf_token`.
    pub async fn submit(&self, path: &str, csrf_token: Option<&str>, body: &Value) -> Result<Submission, SdkError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(session) = &self.session_id {
            request = request.header("x-session-id", session);
        }
        if let Some(token) = csrf_token {
            request = request.header("x-csrf-token", token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let header_num = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };
        let rate_limit_limit = header_num("x-ratelimit-limit").map(|n| n as u32);
        let rate_limit_remaining = header_num("x-ratelimit-remaining").map(|n| n as u32);
        let retry_after_secs = header_num("retry-after");

        let text = resp.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(Submission {
            status,
            rate_limit_limit,
            rate_limit_remaining,
            retry_after_secs,
            body,
        })
    }

    /// Send an analytics event. The server answers success regardless of
    /// whether it kept the event.
    pub async fn track(&self, event: &TrackedEvent) -> Result<(), SdkError> {
        let resp = self
            .client
            .post(format!("{}/api/analytics/events", self.base_url))
            .json(event)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SdkError::Status { status, body });
        }
        Ok(())
    }
}
