//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → sweepers and reload loop exit
//!                                 → server stops accepting, drains
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reload configuration from disk
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
