//! Event ingestion.
//!
//! Ingestion never fails from the caller's point of view. Every input ends as
//! either an accepted [`StoredEvent`] handed to the sinks or a counted
//! [`DropReason`]; tracking must never break the page that sent it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::analytics::event::{
    AnalyticsEvent, EventType, StoredEvent, LABEL_FIELDS, MAX_ATTRIBUTION_LEN, MAX_CONVERSION_MINUTES,
    MAX_ID_LEN, MAX_LABEL_LEN,
};
use crate::analytics::sink::{EventSink, MemoryEventSink};
use crate::analytics::summary::AnalyticsSummary;
use crate::clock::Clock;
use crate::config::AnalyticsConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingEventType,
    UnknownEventType,
    MissingSessionId,
    MissingField(&'static str),
    InvalidField(&'static str),
    Malformed,
    Disabled,
}

impl DropReason {
    /// Reason without the field name, for metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::MissingEventType => "missing_event_type",
            DropReason::UnknownEventType => "unknown_event_type",
            DropReason::MissingSessionId => "missing_session_id",
            DropReason::MissingField(_) => "missing_field",
            DropReason::InvalidField(_) => "invalid_field",
            DropReason::Malformed => "malformed",
            DropReason::Disabled => "disabled",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingField(field) | DropReason::InvalidField(field) => {
                write!(f, "{}({})", self.label(), field)
            }
            _ => f.write_str(self.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted(Uuid),
    Dropped(DropReason),
}

/// Accepts tracker events, validates them and fans them out to the sinks.
pub struct EventIngestor {
    enabled: bool,
    memory: Arc<MemoryEventSink>,
    sinks: Vec<Arc<dyn EventSink>>,
    dropped: Mutex<BTreeMap<String, u64>>,
    clock: Arc<dyn Clock>,
}

impl EventIngestor {
    pub fn new(config: &AnalyticsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled: config.enabled,
            memory: Arc::new(
                MemoryEventSink::new(config.memory_capacity).with_max_tracked_keys(config.max_tracked_keys),
            ),
            sinks: Vec::new(),
            dropped: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    /// Add a sink that receives every accepted event after the memory sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn memory(&self) -> &Arc<MemoryEventSink> {
        &self.memory
    }

    /// Ingest a raw request body.
    pub fn ingest_bytes(&self, body: &[u8]) -> IngestOutcome {
        if !self.enabled {
            return self.drop_event(DropReason::Disabled);
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.ingest(&value),
            Err(e) => {
                tracing::debug!(error = %e, "Unparsable analytics payload");
                self.drop_event(DropReason::Malformed)
            }
        }
    }

    /// Ingest a decoded JSON value.
    pub fn ingest(&self, raw: &Value) -> IngestOutcome {
        if !self.enabled {
            return self.drop_event(DropReason::Disabled);
        }
        let event = match parse_event(raw) {
            Ok(event) => event,
            Err(reason) => return self.drop_event(reason),
        };

        let received_at = DateTime::from_timestamp_millis(self.clock.now_millis() as i64)
            .unwrap_or_else(Utc::now);
        let stored = StoredEvent::from_event(event, received_at);
        let id = stored.id;

        self.persist(&stored);
        metrics::record_analytics_event(stored.event_type.as_str());
        tracing::debug!(
            event_id = %id,
            event_type = stored.event_type.as_str(),
            session_id = %stored.session_id,
            "Analytics event accepted"
        );
        IngestOutcome::Accepted(id)
    }

    pub fn summary(&self) -> AnalyticsSummary {
        let dropped = self.lock_dropped().clone();
        self.memory.with_aggregates(|agg| agg.summary(&dropped))
    }

    fn persist(&self, event: &StoredEvent) {
        let sinks = std::iter::once(self.memory.as_ref() as &dyn EventSink)
            .chain(self.sinks.iter().map(|s| s.as_ref()));
        for sink in sinks {
            if let Err(e) = sink.persist(event) {
                tracing::error!(sink = sink.name(), event_id = %event.id, error = %e, "Failed to persist analytics event");
            }
        }
    }

    fn drop_event(&self, reason: DropReason) -> IngestOutcome {
        tracing::debug!(reason = %reason, "Analytics event dropped");
        metrics::record_analytics_dropped(reason.label());
        *self.lock_dropped().entry(reason.to_string()).or_default() += 1;
        IngestOutcome::Dropped(reason)
    }

    fn lock_dropped(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, u64>> {
        self.dropped.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Validate a raw payload into an [`AnalyticsEvent`].
pub fn parse_event(raw: &Value) -> Result<AnalyticsEvent, DropReason> {
    let object = raw.as_object().ok_or(DropReason::Malformed)?;

    let event_type = match object.get("eventType") {
        None | Some(Value::Null) => return Err(DropReason::MissingEventType),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(DropReason::MissingEventType),
        Some(Value::String(s)) => EventType::parse(s.trim()).ok_or(DropReason::UnknownEventType)?,
        Some(_) => return Err(DropReason::Malformed),
    };

    let session_id = match optional_str(object, "sessionId", MAX_ID_LEN)? {
        Some(s) => s,
        None => return Err(DropReason::MissingSessionId),
    };

    let event_data = match object.get("eventData") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(DropReason::InvalidField("eventData")),
    };

    let user_id = optional_str(object, "userId", MAX_ID_LEN)?;
    if event_type.requires_user_id() && user_id.is_none() {
        return Err(DropReason::MissingField("userId"));
    }

    for field in event_type.required_fields() {
        if event_data.get(*field).is_none_or(is_blank) {
            return Err(DropReason::MissingField(*field));
        }
    }

    for field in LABEL_FIELDS {
        if let Some(value) = event_data.get(field) {
            let too_long = value.as_str().is_some_and(|s| s.chars().count() > MAX_LABEL_LEN);
            if too_long || !(value.is_string() || value.is_null()) {
                return Err(DropReason::InvalidField(field));
            }
        }
    }

    if event_type.is_conversion() {
        match event_data.get("conversionTime") {
            None | Some(Value::Null) => {}
            Some(v) if v.as_u64().is_some_and(|m| m <= MAX_CONVERSION_MINUTES) => {}
            Some(_) => return Err(DropReason::InvalidField("conversionTime")),
        }
    }

    if event_type == EventType::FunnelStep
        && !event_data.get("stepNumber").and_then(Value::as_u64).is_some_and(|n| n >= 1)
    {
        return Err(DropReason::InvalidField("stepNumber"));
    }

    let timestamp = match object.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_timestamp(value).ok_or(DropReason::InvalidField("timestamp"))?),
    };

    Ok(AnalyticsEvent {
        event_type,
        event_data,
        user_id,
        session_id,
        referrer: optional_str(object, "referrer", MAX_ATTRIBUTION_LEN)?,
        utm_source: optional_str(object, "utmSource", MAX_ATTRIBUTION_LEN)?,
        utm_medium: optional_str(object, "utmMedium", MAX_ATTRIBUTION_LEN)?,
        utm_campaign: optional_str(object, "utmCampaign", MAX_ATTRIBUTION_LEN)?,
        timestamp,
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Present, non-blank string up to `max_len` characters; blank or null is `None`.
fn optional_str(
    object: &Map<String, Value>,
    field: &'static str,
    max_len: usize,
) -> Result<Option<String>, DropReason> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else if s.chars().count() > max_len {
                Err(DropReason::InvalidField(field))
            } else {
                Ok(Some(s.to_string()))
            }
        }
        Some(_) => Err(DropReason::InvalidField(field)),
    }
}

/// RFC 3339 string or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    const NOW: u64 = 1_700_000_000_000;

    fn ingestor() -> EventIngestor {
        EventIngestor::new(&AnalyticsConfig::default(), Arc::new(ManualClock::new(NOW)))
    }

    #[test]
    fn test_missing_event_type_dropped_without_storing() {
        let ingestor = ingestor();
        let outcome = ingestor.ingest(&json!({ "sessionId": "s-1", "eventData": {} }));
        assert_eq!(outcome, IngestOutcome::Dropped(DropReason::MissingEventType));
        assert!(ingestor.memory().is_empty());
        assert_eq!(ingestor.summary().dropped_by_reason["missing_event_type"], 1);
    }

    #[test]
    fn test_page_view_accepted_with_receive_timestamp() {
        let ingestor = ingestor();
        let outcome = ingestor.ingest(&json!({
            "eventType": "page_view",
            "eventData": { "pagePath": "/remedies", "pageTitle": "Remedies" },
            "sessionId": "s-1",
            "referrer": null,
        }));
        let IngestOutcome::Accepted(id) = outcome else {
            panic!("expected accepted, got {:?}", outcome);
        };

        let stored = ingestor.memory().recent(1).remove(0);
        assert_eq!(stored.id, id);
        assert_eq!(stored.timestamp.timestamp_millis(), NOW as i64);
        assert_eq!(stored.referrer, None);
        assert_eq!(ingestor.summary().page_views["/remedies"], 1);
    }

    #[test]
    fn test_unparsable_body_is_malformed() {
        let ingestor = ingestor();
        assert_eq!(
            ingestor.ingest_bytes(b"{not json"),
            IngestOutcome::Dropped(DropReason::Malformed)
        );
        assert_eq!(
            ingestor.ingest(&json!(["page_view"])),
            IngestOutcome::Dropped(DropReason::Malformed)
        );
    }

    #[test]
    fn test_required_fields_per_type() {
        let cases = [
            (json!({ "eventType": "purchase", "sessionId": "s" }), DropReason::UnknownEventType),
            (json!({ "eventType": "page_view", "eventData": { "pagePath": "/" } }), DropReason::MissingSessionId),
            (
                json!({ "eventType": "page_view", "sessionId": "s", "eventData": { "pagePath": "/" } }),
                DropReason::MissingField("pageTitle"),
            ),
            (
                json!({ "eventType": "user_registration", "sessionId": "s", "eventData": { "acquisitionChannel": "ads" } }),
                DropReason::MissingField("userId"),
            ),
            (
                json!({ "eventType": "appointment_booking", "sessionId": "s",
                        "eventData": { "appointmentId": "a1", "serviceType": "consult" } }),
                DropReason::MissingField("status"),
            ),
            (
                json!({ "eventType": "newsletter_signup", "sessionId": "s",
                        "eventData": { "subscriberId": "n1", "signupSource": "footer", "conversionTime": -3 } }),
                DropReason::InvalidField("conversionTime"),
            ),
            (
                json!({ "eventType": "funnel_step", "sessionId": "s",
                        "eventData": { "funnelName": "booking", "stepName": "start", "stepNumber": 0 } }),
                DropReason::InvalidField("stepNumber"),
            ),
            (
                json!({ "eventType": "scroll_depth", "sessionId": "s", "timestamp": "yesterday" }),
                DropReason::InvalidField("timestamp"),
            ),
            (
                json!({ "eventType": "scroll_depth", "sessionId": "s", "eventData": "depth=50" }),
                DropReason::InvalidField("eventData"),
            ),
        ];

        for (raw, expected) in cases {
            assert_eq!(parse_event(&raw), Err(expected), "{}", raw);
        }
    }

    #[test]
    fn test_implausible_values_dropped() {
        let long_path = format!("/{}", "a".repeat(MAX_LABEL_LEN));
        let cases = [
            (
                json!({ "eventType": "newsletter_signup", "sessionId": "s",
                        "eventData": { "subscriberId": "n1", "signupSource": "footer", "conversionTime": u64::MAX } }),
                DropReason::InvalidField("conversionTime"),
            ),
            (
                json!({ "eventType": "page_view", "sessionId": "s",
                        "eventData": { "pagePath": long_path, "pageTitle": "Home" } }),
                DropReason::InvalidField("pagePath"),
            ),
            (
                json!({ "eventType": "funnel_step", "sessionId": "s",
                        "eventData": { "funnelName": ["booking"], "stepName": "start", "stepNumber": 1 } }),
                DropReason::InvalidField("funnelName"),
            ),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_event(&raw), Err(expected));
        }

        let max = json!({ "eventType": "newsletter_signup", "sessionId": "s",
                          "eventData": { "subscriberId": "n1", "signupSource": "footer",
                                         "conversionTime": MAX_CONVERSION_MINUTES } });
        assert!(parse_event(&max).is_ok());
    }

    #[test]
    fn test_huge_conversion_times_never_panic() {
        let ingestor = ingestor();
        let raw = json!({ "eventType": "newsletter_signup", "sessionId": "s",
                          "eventData": { "subscriberId": "n1", "signupSource": "footer", "conversionTime": u64::MAX } });
        for _ in 0..2 {
            assert!(matches!(ingestor.ingest(&raw), IngestOutcome::Dropped(_)));
        }
        assert_eq!(ingestor.summary().total_dropped, 2);
    }

    #[test]
    fn test_conversion_with_null_time_accepted() {
        let event = parse_event(&json!({
            "eventType": "user_registration",
            "userId": "u-9",
            "sessionId": "s",
            "eventData": { "acquisitionChannel": "organic", "conversionTime": null },
            "timestamp": "2026-03-01T12:00:00Z",
        }))
        .unwrap();
        assert_eq!(event.user_id.as_deref(), Some("u-9"));
        assert_eq!(event.timestamp.unwrap().to_rfc3339(), "2026-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_disabled_drops_everything() {
        let config = AnalyticsConfig {
            enabled: false,
            ..AnalyticsConfig::default()
        };
        let ingestor = EventIngestor::new(&config, Arc::new(ManualClock::new(NOW)));
        let outcome = ingestor.ingest(&json!({ "eventType": "page_leave", "sessionId": "s" }));
        assert_eq!(outcome, IngestOutcome::Dropped(DropReason::Disabled));
    }

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReason::MissingField("pagePath").to_string(), "missing_field(pagePath)");
        assert_eq!(DropReason::Malformed.to_string(), "malformed");
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn persist(&self, _event: &StoredEvent) -> Result<(), crate::analytics::sink::SinkError> {
            Err(crate::analytics::sink::SinkError::Unavailable("disk full".into()))
        }
    }

    #[test]
    fn test_sink_failure_swallowed() {
        let ingestor = ingestor().with_sink(Arc::new(FailingSink));
        let outcome = ingestor.ingest(&json!({ "eventType": "time_on_page", "sessionId": "s" }));
        assert!(matches!(outcome, IngestOutcome::Accepted(_)));
        assert_eq!(ingestor.memory().len(), 1);
    }
}
