//! Request-security middleware and analytics ingestion for a storefront.
//!
//! Rate limiting, CSRF, honeypot, validation, spam filtering, sanitization,
//! security headers and an audit trail in front of the site's form
//! endpoints, plus an open analytics event sink with dashboard aggregates.

pub mod admin;
pub mod analytics;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GuardConfig;
pub use error::GuardError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
