//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (sliding window per endpoint class)
//!     → guard.rs (csrf → honeypot → validator → spam → sanitize)
//!     → handler
//!     → headers.rs (security headers on every response)
//!
//! Every rejection → audit.rs
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Rate-limit state behind a store trait so a shared cache can replace it
//! - Denylists and presets are configuration, swapped at runtime

pub mod access_control;
pub mod audit;
pub mod csrf;
pub mod guard;
pub mod headers;
pub mod rate_limit;
pub mod sanitize;
pub mod schemas;
pub mod spam;
pub mod store;
pub mod validator;

pub use audit::{AuditLog, SecurityEvent, SecurityEventKind};
pub use guard::{RequestGuard, SubmissionPolicy};
pub use rate_limit::{RateLimitClass, RateLimiterState, SlidingWindowLimiter};
pub use store::{InMemoryStore, RateLimitStore};
