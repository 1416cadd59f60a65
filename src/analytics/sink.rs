//! Persistence targets for accepted events.
//!
//! The in-memory sink keeps a bounded window of recent events plus running
//! aggregates over everything it has seen. The file sink appends JSON lines
//! through a background writer.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::analytics::event::StoredEvent;
use crate::analytics::summary::Aggregator;
use crate::observability::jsonl::JsonLinesWriter;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for accepted analytics events.
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn persist(&self, event: &StoredEvent) -> Result<(), SinkError>;
}

struct MemoryState {
    recent: VecDeque<StoredEvent>,
    aggregates: Aggregator,
}

/// Bounded in-memory sink with aggregation.
pub struct MemoryEventSink {
    state: Mutex<MemoryState>,
    capacity: usize,
}

impl MemoryEventSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                recent: VecDeque::with_capacity(capacity.min(1024)),
                aggregates: Aggregator::default(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Cap the distinct page paths, funnels and steps per funnel the
    /// aggregates track.
    pub fn with_max_tracked_keys(self, max_keys: usize) -> Self {
        self.lock().aggregates = Aggregator::with_key_limit(max_keys);
        self
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<StoredEvent> {
        self.lock().recent.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn with_aggregates<R>(&self, f: impl FnOnce(&Aggregator) -> R) -> R {
        f(&self.lock().aggregates)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for MemoryEventSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn persist(&self, event: &StoredEvent) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.aggregates.record(event);
        if state.recent.len() >= self.capacity {
            state.recent.pop_front();
        }
        state.recent.push_back(event.clone());
        Ok(())
    }
}

/// Appends events to a JSON-lines file.
pub struct JsonlEventSink {
    writer: JsonLinesWriter<StoredEvent>,
}

impl JsonlEventSink {
    /// Must be called inside a tokio runtime.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        JsonLinesWriter::spawn(&path, "analytics")
            .map(|writer| Self { writer })
            .ok_or_else(|| SinkError::Unavailable(format!("no runtime for {}", path.display())))
    }
}

impl EventSink for JsonlEventSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn persist(&self, event: &StoredEvent) -> Result<(), SinkError> {
        self.writer.send(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::event::{AnalyticsEvent, EventType};
    use chrono::DateTime;
    use serde_json::Map;
    use std::collections::BTreeMap;

    fn event(session: &str) -> StoredEvent {
        StoredEvent::from_event(
            AnalyticsEvent {
                event_type: EventType::TimeOnPage,
                event_data: Map::new(),
                user_id: None,
                session_id: session.into(),
                referrer: None,
                utm_source: None,
                utm_medium: None,
                utm_campaign: None,
                timestamp: None,
            },
            DateTime::from_timestamp_millis(0).unwrap(),
        )
    }

    #[test]
    fn test_memory_sink_bounded_but_aggregates_everything() {
        let sink = MemoryEventSink::new(2);
        for s in ["a", "b", "c"] {
            sink.persist(&event(s)).unwrap();
        }
        assert_eq!(sink.len(), 2);
        let recent: Vec<_> = sink.recent(10).into_iter().map(|e| e.session_id).collect();
        assert_eq!(recent, vec!["c", "b"]);

        let total = sink.with_aggregates(|agg| agg.summary(&BTreeMap::new()).total_events);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_jsonl_sink_requires_runtime() {
        assert!(matches!(
            JsonlEventSink::new("/tmp/unused-analytics.log"),
            Err(SinkError::Unavailable(_))
        ));
    }
}
