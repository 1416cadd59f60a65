//! Running aggregates for the admin dashboard.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::analytics::event::{EventType, StoredEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSummary {
    pub count: u64,
    /// Conversions that carried a `conversionTime`.
    pub timed: u64,
    pub average_conversion_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStepSummary {
    pub step_number: u64,
    pub step_name: String,
    pub count: u64,
}

/// Snapshot returned by `GET /admin/analytics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_events: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub page_views: BTreeMap<String, u64>,
    pub conversions: BTreeMap<String, ConversionSummary>,
    /// Steps ordered by step number.
    pub funnels: BTreeMap<String, Vec<FunnelStepSummary>>,
    pub total_dropped: u64,
    pub dropped_by_reason: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct ConversionTotals {
    count: u64,
    timed: u64,
    minutes: u64,
}

/// Key that collects page paths, funnels and steps past the key limit.
pub const OTHER_BUCKET: &str = "(other)";

/// Step number of the overflow step; real steps start at 1.
const OTHER_STEP: u64 = 0;

const DEFAULT_MAX_TRACKED_KEYS: usize = 1_000;

/// Incrementally maintained totals over every accepted event.
///
/// Page paths, funnel names and steps per funnel are client supplied, so
/// each map holds at most `max_keys` distinct entries plus an overflow
/// bucket.
#[derive(Debug)]
pub struct Aggregator {
    max_keys: usize,
    total: u64,
    by_type: BTreeMap<EventType, u64>,
    page_views: BTreeMap<String, u64>,
    conversions: BTreeMap<EventType, ConversionTotals>,
    funnels: BTreeMap<String, BTreeMap<u64, (String, u64)>>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::with_key_limit(DEFAULT_MAX_TRACKED_KEYS)
    }
}

impl Aggregator {
    pub fn with_key_limit(max_keys: usize) -> Self {
        Self {
            max_keys: max_keys.max(1),
            total: 0,
            by_type: BTreeMap::new(),
            page_views: BTreeMap::new(),
            conversions: BTreeMap::new(),
            funnels: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, event: &StoredEvent) {
        self.total = self.total.saturating_add(1);
        bump(self.by_type.entry(event.event_type).or_default());

        match event.event_type {
            EventType::PageView => {
                if let Some(path) = event.data_str("pagePath") {
                    let key = bounded_key(&self.page_views, path, self.max_keys);
                    bump(self.page_views.entry(key).or_default());
                }
            }
            EventType::FunnelStep => {
                let funnel = event.data_str("funnelName");
                let step = event.data_u64("stepNumber");
                if let (Some(funnel), Some(step)) = (funnel, step) {
                    let key = bounded_key(&self.funnels, funnel, self.max_keys);
                    let steps = self.funnels.entry(key).or_default();
                    let (step, name) = if steps.contains_key(&step) || steps.len() < self.max_keys {
                        (step, event.data_str("stepName").unwrap_or_default())
                    } else {
                        (OTHER_STEP, OTHER_BUCKET)
                    };
                    let entry = steps.entry(step).or_insert_with(|| (name.to_string(), 0));
                    bump(&mut entry.1);
                }
            }
            t if t.is_conversion() => {
                let totals = self.conversions.entry(t).or_default();
                bump(&mut totals.count);
                if let Some(minutes) = event.data_u64("conversionTime") {
                    bump(&mut totals.timed);
                    totals.minutes = totals.minutes.saturating_add(minutes);
                }
            }
            _ => {}
        }
    }

    pub fn summary(&self, dropped: &BTreeMap<String, u64>) -> AnalyticsSummary {
        AnalyticsSummary {
            total_events: self.total,
            events_by_type: self
                .by_type
                .iter()
                .map(|(t, n)| (t.as_str().to_string(), *n))
                .collect(),
            page_views: self.page_views.clone(),
            conversions: self
                .conversions
                .iter()
                .map(|(t, totals)| {
                    let average = (totals.timed > 0).then(|| totals.minutes as f64 / totals.timed as f64);
                    (
                        t.as_str().to_string(),
                        ConversionSummary {
                            count: totals.count,
                            timed: totals.timed,
                            average_conversion_minutes: average,
                        },
                    )
                })
                .collect(),
            funnels: self
                .funnels
                .iter()
                .map(|(funnel, steps)| {
                    let steps = steps
                        .iter()
                        .map(|(number, (name, count))| FunnelStepSummary {
                            step_number: *number,
                            step_name: name.clone(),
                            count: *count,
                        })
                        .collect();
                    (funnel.clone(), steps)
                })
                .collect(),
            total_dropped: dropped.values().sum(),
            dropped_by_reason: dropped.clone(),
        }
    }
}

fn bump(counter: &mut u64) {
    *counter = counter.saturating_add(1);
}

/// `key` itself while it is tracked or there is room, else the overflow bucket.
fn bounded_key<V>(map: &BTreeMap<String, V>, key: &str, max_keys: usize) -> String {
    if map.contains_key(key) || map.len() < max_keys {
        key.to_string()
    } else {
        OTHER_BUCKET.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::event::AnalyticsEvent;
    use chrono::DateTime;
    use serde_json::{json, Value};

    fn stored(event_type: EventType, data: Value) -> StoredEvent {
        let event = AnalyticsEvent {
            event_type,
            event_data: data.as_object().cloned().unwrap(),
            user_id: None,
            session_id: "s".into(),
            referrer: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            timestamp: None,
        };
        StoredEvent::from_event(event, DateTime::from_timestamp_millis(0).unwrap())
    }

    #[test]
    fn test_page_views_by_path() {
        let mut agg = Aggregator::default();
        agg.record(&stored(EventType::PageView, json!({ "pagePath": "/", "pageTitle": "Home" })));
        agg.record(&stored(EventType::PageView, json!({ "pagePath": "/", "pageTitle": "Home" })));
        agg.record(&stored(EventType::PageView, json!({ "pagePath": "/blog", "pageTitle": "Blog" })));

        let summary = agg.summary(&BTreeMap::new());
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.page_views["/"], 2);
        assert_eq!(summary.page_views["/blog"], 1);
        assert_eq!(summary.events_by_type["page_view"], 3);
    }

    #[test]
    fn test_conversion_average_ignores_untimed() {
        let mut agg = Aggregator::default();
        let data = |t: Value| json!({ "subscriberId": "n1", "signupSource": "footer", "conversionTime": t });
        agg.record(&stored(EventType::NewsletterSignup, data(json!(10))));
        agg.record(&stored(EventType::NewsletterSignup, data(json!(20))));
        agg.record(&stored(EventType::NewsletterSignup, data(Value::Null)));

        let summary = agg.summary(&BTreeMap::new());
        let newsletter = &summary.conversions["newsletter_signup"];
        assert_eq!(newsletter.count, 3);
        assert_eq!(newsletter.timed, 2);
        assert_eq!(newsletter.average_conversion_minutes, Some(15.0));
    }

    #[test]
    fn test_funnel_steps_ordered() {
        let mut agg = Aggregator::default();
        let step = |n: u64, name: &str| {
            json!({ "funnelName": "booking", "stepName": name, "stepNumber": n })
        };
        agg.record(&stored(EventType::FunnelStep, step(2, "details")));
        agg.record(&stored(EventType::FunnelStep, step(1, "start")));
        agg.record(&stored(EventType::FunnelStep, step(1, "start")));

        let summary = agg.summary(&BTreeMap::new());
        let steps = &summary.funnels["booking"];
        assert_eq!(steps[0], FunnelStepSummary { step_number: 1, step_name: "start".into(), count: 2 });
        assert_eq!(steps[1].step_number, 2);
    }

    #[test]
    fn test_conversion_minutes_saturate() {
        let mut agg = Aggregator::default();
        let data = json!({ "subscriberId": "n1", "signupSource": "footer", "conversionTime": u64::MAX });
        agg.record(&stored(EventType::NewsletterSignup, data.clone()));
        agg.record(&stored(EventType::NewsletterSignup, data));

        let newsletter = &agg.summary(&BTreeMap::new()).conversions["newsletter_signup"];
        assert_eq!(newsletter.timed, 2);
        assert!(newsletter.average_conversion_minutes.is_some_and(f64::is_finite));
    }

    #[test]
    fn test_page_paths_capped_into_other() {
        let mut agg = Aggregator::with_key_limit(2);
        for path in ["/a", "/b", "/c", "/d", "/a"] {
            agg.record(&stored(EventType::PageView, json!({ "pagePath": path, "pageTitle": "T" })));
        }

        let summary = agg.summary(&BTreeMap::new());
        // The overflow bucket is the one extra key.
        assert_eq!(summary.page_views.len(), 3);
        assert_eq!(summary.page_views["/a"], 2);
        assert_eq!(summary.page_views[OTHER_BUCKET], 2);
        assert_eq!(summary.total_events, 5);
    }

    #[test]
    fn test_funnels_and_steps_capped() {
        let mut agg = Aggregator::with_key_limit(1);
        let step = |funnel: &str, n: u64| {
            json!({ "funnelName": funnel, "stepName": format!("step-{}", n), "stepNumber": n })
        };
        agg.record(&stored(EventType::FunnelStep, step("booking", 1)));
        agg.record(&stored(EventType::FunnelStep, step("booking", 2)));
        agg.record(&stored(EventType::FunnelStep, step("checkout", 1)));

        let summary = agg.summary(&BTreeMap::new());
        let booking = &summary.funnels["booking"];
        assert_eq!(booking.len(), 2);
        assert_eq!(booking[0].step_number, OTHER_STEP);
        assert_eq!(booking[0].step_name, OTHER_BUCKET);
        assert_eq!(booking[1].step_name, "step-1");
        assert_eq!(summary.funnels[OTHER_BUCKET][0].count, 1);
    }

    #[test]
    fn test_dropped_counts_carried() {
        let dropped = BTreeMap::from([("missing_event_type".to_string(), 2), ("malformed".to_string(), 1)]);
        let summary = Aggregator::default().summary(&dropped);
        assert_eq!(summary.total_dropped, 3);
        assert_eq!(summary.dropped_by_reason["missing_event_type"], 2);
    }
}
