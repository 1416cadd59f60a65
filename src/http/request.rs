//! Per-request client context.
//!
//! # Responsibilities
//! - Resolve the client identity used as the rate-limit key
//! - Capture user agent, request id and path for the audit trail
//! - Carry the session id supplied by the identity provider
//!
//! # Design Decisions
//! - Resolved once by middleware and stored in request extensions
//! - `X-Forwarded-For` is honoured only when configured; without a trusted
//!   proxy in front the header is client-controlled and keys are spoofable
//! - The header is read from the right: proxies append, so only entries
//!   added by our own proxies can be believed

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderName, Request},
    middleware::Next,
    response::Response,
};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_SESSION_ID: HeaderName = HeaderName::from_static("x-session-id");
pub const X_CSRF_TOKEN: HeaderName = HeaderName::from_static("x-csrf-token");
pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");

/// Who sent the request, as far as this layer can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub ip: String,
    pub user_agent: String,
    pub request_id: Option<String>,
    pub path: String,
    pub session_id: Option<String>,
}

impl Default for ClientContext {
    fn default() -> Self {
        Self {
            ip: "unknown".to_string(),
            user_agent: String::new(),
            request_id: None,
            path: String::new(),
            session_id: None,
        }
    }
}

impl ClientContext {
    /// Build the context from request parts.
    ///
    /// `trusted_proxies` is `None` when `X-Forwarded-For` is ignored.
    pub fn resolve(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        path: &str,
        trusted_proxies: Option<&[IpAddr]>,
    ) -> Self {
        let forwarded = trusted_proxies.and_then(|trusted| {
            header_str(headers, &X_FORWARDED_FOR).and_then(|v| forwarded_client(v, trusted))
        });

        let ip = forwarded
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            ip,
            user_agent: header_str(headers, &header::USER_AGENT)
                .unwrap_or_default()
                .to_string(),
            request_id: header_str(headers, &X_REQUEST_ID).map(str::to_string),
            path: path.to_string(),
            session_id: header_str(headers, &X_SESSION_ID)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        }
    }
}

/// Rightmost `X-Forwarded-For` entry that is not one of our proxies.
///
/// Entries left of it were written by the client. An unparsable entry ends
/// the walk, since nothing before it can be trusted either.
fn forwarded_client(header: &str, trusted: &[IpAddr]) -> Option<String> {
    for entry in header.rsplit(',') {
        let ip: IpAddr = entry.trim().parse().ok()?;
        if !trusted.contains(&ip) {
            return Some(ip.to_string());
        }
    }
    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Middleware state for context resolution.
#[derive(Debug, Clone, Default)]
pub struct ClientContextConfig {
    /// Set when `X-Forwarded-For` is honoured; lists our own proxies.
    pub trusted_proxies: Option<Arc<[IpAddr]>>,
}

/// Resolve the [`ClientContext`] and store it in request extensions.
pub async fn client_context_middleware(
    State(config): State<ClientContextConfig>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let context = ClientContext::resolve(
        request.headers(),
        peer,
        request.uri().path(),
        config.trusted_proxies.as_deref(),
    );
    request.extensions_mut().insert(context);
    next.run(request).await
}

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<ClientContext>() {
            return Ok(context.clone());
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientContext::resolve(&parts.headers, peer, parts.uri.path(), None))
    }
}
