//! Per-session analytics tracker.
//!
//! A `Tracker` owns one browsing session: its id, the first-visit marker
//! used to derive `conversionTime`, and the funnel step counters. It only
//! builds events; send them with [`GuardClient::track`](crate::GuardClient::track).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Map, Value};

const MILLIS_PER_MINUTE: u64 = 60_000;

/// Campaign attribution captured at landing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

/// Event in the shape the ingest endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    pub event_type: &'static str,
    pub event_data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

type NowFn = Arc<dyn Fn() -> u64 + Send + Sync>;

pub struct Tracker {
    session_id: String,
    user_id: Option<String>,
    attribution: Attribution,
    first_visit_ms: Option<u64>,
    funnel_steps: HashMap<String, u64>,
    now: NowFn,
}

impl Tracker {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            attribution: Attribution::default(),
            first_visit_ms: None,
            funnel_steps: HashMap::new(),
            now: Arc::new(system_now_ms),
        }
    }

    /// Replace the time source (epoch milliseconds).
    pub fn with_clock(mut self, now: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.now = Arc::new(now);
        self
    }

    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }

    /// Resume a session whose first visit was recorded earlier.
    pub fn with_first_visit(mut self, first_visit_ms: u64) -> Self {
        self.first_visit_ms = Some(first_visit_ms);
        self
    }

    pub fn identify(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn first_visit_ms(&self) -> Option<u64> {
        self.first_visit_ms
    }

    pub fn page_view(&mut self, path: &str, title: &str) -> TrackedEvent {
        self.build("page_view", json!({ "pagePath": path, "pageTitle": title }))
    }

    /// Registration conversion; also identifies the session's user.
    pub fn registration(&mut self, user_id: &str, channel: &str) -> TrackedEvent {
        self.identify(user_id);
        self.conversion("user_registration", json!({ "acquisitionChannel": channel }))
    }

    pub fn appointment_booking(&mut self, appointment_id: &str, service_type: &str, status: &str) -> TrackedEvent {
        self.conversion(
            "appointment_booking",
            json!({ "appointmentId": appointment_id, "serviceType": service_type, "status": status }),
        )
    }

    pub fn newsletter_signup(&mut self, subscriber_id: &str, source: &str) -> TrackedEvent {
        self.conversion(
            "newsletter_signup",
            json!({ "subscriberId": subscriber_id, "signupSource": source }),
        )
    }

    /// Next step of `funnel`. Steps are numbered from 1 per funnel.
    pub fn funnel_step(&mut self, funnel: &str, step_name: &str) -> TrackedEvent {
        let counter = self.funnel_steps.entry(funnel.to_string()).or_insert(0);
        *counter += 1;
        let step_number = *counter;
        self.build(
            "funnel_step",
            json!({ "funnelName": funnel, "stepName": step_name, "stepNumber": step_number }),
        )
    }

    pub fn scroll_depth(&mut self, percent: u8) -> TrackedEvent {
        self.build("scroll_depth", json!({ "depthPercent": percent.min(100) }))
    }

    pub fn time_on_page(&mut self, path: &str, seconds: u64) -> TrackedEvent {
        self.build("time_on_page", json!({ "pagePath": path, "seconds": seconds }))
    }

    pub fn external_link_click(&mut self, url: &str) -> TrackedEvent {
        self.build("external_link_click", json!({ "url": url }))
    }

    pub fn page_leave(&mut self, path: &str) -> TrackedEvent {
        self.build("page_leave", json!({ "pagePath": path }))
    }

    /// Whole minutes since the first visit, or `None` when no marker exists
    /// yet. In the latter case `now` becomes the marker.
    fn conversion_minutes(&mut self, now: u64) -> Option<u64> {
        match self.first_visit_ms {
            Some(first) => Some(now.saturating_sub(first) / MILLIS_PER_MINUTE),
            None => {
                self.first_visit_ms = Some(now);
                None
            }
        }
    }

    fn conversion(&mut self, event_type: &'static str, data: Value) -> TrackedEvent {
        let now = (self.now)();
        let minutes = self.conversion_minutes(now);
        let mut event = self.event_at(event_type, data, now);
        event.event_data.insert("conversionTime".into(), json!(minutes));
        event
    }

    fn build(&mut self, event_type: &'static str, data: Value) -> TrackedEvent {
        let now = (self.now)();
        self.first_visit_ms.get_or_insert(now);
        self.event_at(event_type, data, now)
    }

    fn event_at(&self, event_type: &'static str, data: Value, now: u64) -> TrackedEvent {
        let event_data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        TrackedEvent {
            event_type,
            event_data,
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            referrer: self.attribution.referrer.clone(),
            utm_source: self.attribution.utm_source.clone(),
            utm_medium: self.attribution.utm_medium.clone(),
            utm_campaign: self.attribution.utm_campaign.clone(),
            timestamp: now,
        }
    }
}

fn system_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
