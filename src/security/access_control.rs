//! Caller identity and role checks.
//!
//! Identity comes from the upstream authentication layer as trusted
//! `X-User-Id` / `X-User-Role` headers. This layer never authenticates users
//! itself; it only decides whether a known role may reach a route.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::http::request::{X_USER_ID, X_USER_ROLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Customer,
    Anonymous,
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "" => Role::Anonymous,
            _ => Role::Customer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
            Role::Anonymous => "anonymous",
        }
    }
}

/// Caller as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            role: Role::Anonymous,
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_id = headers
            .get(&X_USER_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let role = headers
            .get(&X_USER_ROLE)
            .and_then(|v| v.to_str().ok())
            .map(Role::parse)
            .unwrap_or(Role::Anonymous);

        // A role without a user is not an identity.
        if user_id.is_none() {
            return Self::anonymous();
        }
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity::from_headers(&parts.headers))
    }
}

/// Compare a presented bearer credential with the configured key.
///
/// Runs over the full length of both inputs so timing does not reveal the
/// matching prefix.
pub fn bearer_matches(authorization: Option<&str>, api_key: &str) -> bool {
    let Some(presented) = authorization.and_then(|v| v.strip_prefix("Bearer ")) else {
        return false;
    };
    let (a, b) = (presented.trim().as_bytes(), api_key.as_bytes());
    if api_key.is_empty() {
        return false;
    }
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}
