//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! guard.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps hot-reloadable policy (spam denylist, rate presets)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AnalyticsConfig, AuditConfig, CsrfConfig, GuardConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, RateLimitConfig, RateLimitPresets, SecurityConfig,
    SpamConfig, TimeoutConfig, WindowConfig,
};
