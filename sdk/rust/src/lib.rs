//! Client SDK for the storefront guard service.
//!
//! [`GuardClient`] talks to the gated form endpoints; [`Tracker`] builds
//! analytics events for one browsing session.

pub mod client;
pub mod tracker;

pub use client::{CsrfToken, GuardClient, SdkError, Submission};
pub use tracker::{Attribution, TrackedEvent, Tracker};
