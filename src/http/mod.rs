//! HTTP surface of the guard service.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace, timeout, body limit)
//!     → request.rs (resolve client context)
//!     → security::rate_limit (per-route class)
//!     → handlers.rs (guard, store, mail / analytics ingest)
//!     → response.rs (success shapes) or GuardError (rejections)
//!     → security::headers (on every response)
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{ClientContext, X_REQUEST_ID};
pub use server::{build_router, AppState, Components, HttpServer};
