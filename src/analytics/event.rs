//! Analytics event model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Longest accepted session or user id, in characters.
pub const MAX_ID_LEN: usize = 128;

/// Longest accepted referrer or UTM value, in characters.
pub const MAX_ATTRIBUTION_LEN: usize = 2048;

/// Longest accepted page path, page title, funnel or step name, in characters.
pub const MAX_LABEL_LEN: usize = 512;

/// Largest accepted `conversionTime`: one year of minutes.
pub const MAX_CONVERSION_MINUTES: u64 = 366 * 24 * 60;

/// `eventData` labels that become aggregation keys or dashboard text.
pub const LABEL_FIELDS: [&str; 4] = ["pagePath", "pageTitle", "funnelName", "stepName"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    UserRegistration,
    AppointmentBooking,
    NewsletterSignup,
    FunnelStep,
    ScrollDepth,
    TimeOnPage,
    ExternalLinkClick,
    PageLeave,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        EventType::PageView,
        EventType::UserRegistration,
        EventType::AppointmentBooking,
        EventType::NewsletterSignup,
        EventType::FunnelStep,
        EventType::ScrollDepth,
        EventType::TimeOnPage,
        EventType::ExternalLinkClick,
        EventType::PageLeave,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::UserRegistration => "user_registration",
            EventType::AppointmentBooking => "appointment_booking",
            EventType::NewsletterSignup => "newsletter_signup",
            EventType::FunnelStep => "funnel_step",
            EventType::ScrollDepth => "scroll_depth",
            EventType::TimeOnPage => "time_on_page",
            EventType::ExternalLinkClick => "external_link_click",
            EventType::PageLeave => "page_leave",
        }
    }

    /// `eventData` keys that must be present.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EventType::PageView => &["pagePath", "pageTitle"],
            EventType::UserRegistration => &["acquisitionChannel"],
            EventType::AppointmentBooking => &["appointmentId", "serviceType", "status"],
            EventType::NewsletterSignup => &["subscriberId", "signupSource"],
            EventType::FunnelStep => &["funnelName", "stepName", "stepNumber"],
            EventType::ScrollDepth
            | EventType::TimeOnPage
            | EventType::ExternalLinkClick
            | EventType::PageLeave => &[],
        }
    }

    /// Conversions may carry `conversionTime` in whole minutes.
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            EventType::UserRegistration | EventType::AppointmentBooking | EventType::NewsletterSignup
        )
    }

    pub fn requires_user_id(&self) -> bool {
        matches!(self, EventType::UserRegistration)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event as sent by the browser tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event_type: EventType,
    #[serde(default)]
    pub event_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Accepted event as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub event_data: Map<String, Value>,
    pub user_id: Option<String>,
    pub session_id: String,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    /// Client timestamp, or receive time when the client sent none.
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn from_event(event: AnalyticsEvent, received_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event.event_type,
            event_data: event.event_data,
            user_id: event.user_id,
            session_id: event.session_id,
            referrer: event.referrer,
            utm_source: event.utm_source,
            utm_medium: event.utm_medium,
            utm_campaign: event.utm_campaign,
            timestamp: event.timestamp.unwrap_or(received_at),
            received_at,
        }
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.event_data.get(key).and_then(Value::as_str)
    }

    pub fn data_u64(&self, key: &str) -> Option<u64> {
        self.event_data.get(key).and_then(Value::as_u64)
    }
}
