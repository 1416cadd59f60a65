//! CSRF token issuance and verification.
//!
//! Tokens are 32 bytes from the OS CSPRNG, hex encoded. With session binding
//! enabled (the default) each issued token is stored with its session and
//! expiry, is accepted only for that session, and is consumed on use when
//! single-use is configured. Shape-only mode accepts any well-formed token
//! and is kept only for clients that cannot fetch a token first.

use std::fmt::Write as _;
use std::sync::Arc;

use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::CsrfConfig;

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 32;

/// Hex characters per token.
pub const TOKEN_LENGTH: usize = TOKEN_BYTES * 2;

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CsrfFailure {
    Missing,
    Malformed,
    Unknown,
    Expired,
    SessionMismatch,
}

impl CsrfFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsrfFailure::Missing => "missing",
            CsrfFailure::Malformed => "malformed",
            CsrfFailure::Unknown => "unknown",
            CsrfFailure::Expired => "expired",
            CsrfFailure::SessionMismatch => "session_mismatch",
        }
    }
}

/// Generate a fresh token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let mut token = String::with_capacity(TOKEN_LENGTH);
    for byte in bytes {
        let _ = write!(token, "{:02x}", byte);
    }
    token
}

/// True if `token` has the shape of a generated token.
pub fn validate_token_shape(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone)]
struct IssuedToken {
    session_id: String,
    expires_at_ms: u64,
}

/// Issued token as returned to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfGrant {
    pub token: String,
    pub session_id: String,
    pub expires_at_ms: u64,
}

/// Server-side token registry.
#[derive(Debug)]
pub struct CsrfProtection {
    issued: DashMap<String, IssuedToken>,
    config: CsrfConfig,
    clock: Arc<dyn Clock>,
}

impl CsrfProtection {
    pub fn new(config: CsrfConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            issued: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Issue a token for `session_id`.
    pub fn issue(&self, session_id: &str) -> CsrfGrant {
        let token = generate_token();
        let expires_at_ms = self.clock.now_millis() + self.config.ttl_secs * 1000;

        if self.config.bind_to_session {
            self.issued.insert(
                token.clone(),
                IssuedToken {
                    session_id: session_id.to_string(),
                    expires_at_ms,
                },
            );
        }

        CsrfGrant {
            token,
            session_id: session_id.to_string(),
            expires_at_ms,
        }
    }

    /// Verify a token presented by `session_id`.
    pub fn verify(&self, session_id: Option<&str>, token: Option<&str>) -> Result<(), CsrfFailure> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(CsrfFailure::Missing),
        };
        if !validate_token_shape(token) {
            return Err(CsrfFailure::Malformed);
        }
        if !self.config.bind_to_session {
            return Ok(());
        }

        let key = token.to_ascii_lowercase();
        let issued = if self.config.single_use {
            // Removed up front so two racing submissions cannot both use it.
            self.issued.remove(&key).map(|(_, issued)| issued)
        } else {
            self.issued.get(&key).map(|r| r.value().clone())
        };
        let issued = issued.ok_or(CsrfFailure::Unknown)?;

        if self.clock.now_millis() >= issued.expires_at_ms {
            self.issued.remove(&key);
            return Err(CsrfFailure::Expired);
        }
        if session_id != Some(issued.session_id.as_str()) {
            return Err(CsrfFailure::SessionMismatch);
        }
        Ok(())
    }

    /// Drop expired tokens. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.issued.len();
        self.issued.retain(|_, issued| issued.expires_at_ms > now);
        before.saturating_sub(self.issued.len())
    }

    pub fn outstanding(&self) -> usize {
        self.issued.len()
    }
}
