//! Analytics event pipeline.
//!
//! # Data Flow
//! ```text
//! POST /api/analytics/events
//!     → ingest.rs (parse, validate, drop or accept)
//!     → sink.rs (memory sink + optional JSON-lines file)
//!     → summary.rs (aggregates for GET /admin/analytics)
//! ```

pub mod event;
pub mod ingest;
pub mod sink;
pub mod summary;

pub use event::{AnalyticsEvent, EventType, StoredEvent};
pub use ingest::{DropReason, EventIngestor, IngestOutcome};
pub use sink::{EventSink, JsonlEventSink, MemoryEventSink, SinkError};
pub use summary::AnalyticsSummary;
