//! Analytics ingestion through the SDK tracker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use storefront_sdk::{Attribution, GuardClient, Tracker};

mod common;

const START_MS: u64 = 1_760_000_000_000;

#[tokio::test]
async fn test_tracked_session_shows_in_summary() {
    let guard = common::start_guard(common::test_config()).await;
    let client = GuardClient::new(&guard.base_url);

    let clock = Arc::new(AtomicU64::new(START_MS));
    let now = clock.clone();
    let mut tracker = Tracker::new("session-analytics")
        .with_clock(move || now.load(Ordering::SeqCst))
        .with_attribution(Attribution {
            utm_source: Some("newsletter".into()),
            utm_campaign: Some("autumn".into()),
            ..Default::default()
        });

    client.track(&tracker.page_view("/", "Home")).await.unwrap();
    client.track(&tracker.page_view("/services", "Services")).await.unwrap();
    client.track(&tracker.funnel_step("booking", "start")).await.unwrap();
    client.track(&tracker.funnel_step("booking", "details")).await.unwrap();

    clock.store(START_MS + 7 * 60_000, Ordering::SeqCst);
    client
        .track(&tracker.appointment_booking("appt-1", "consultation", "requested"))
        .await
        .unwrap();

    let summary = common::admin_get(&guard, "/admin/analytics").await;
    assert_eq!(summary["totalEvents"], 5);
    assert_eq!(summary["eventsByType"]["page_view"], 2);
    assert_eq!(summary["pageViews"]["/services"], 1);

    let booking = &summary["conversions"]["appointment_booking"];
    assert_eq!(booking["count"], 1);
    assert_eq!(booking["averageConversionMinutes"], 7.0);

    let steps = summary["funnels"]["booking"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["stepNumber"], 1);
    assert_eq!(steps[1]["stepName"], "details");
}

#[tokio::test]
async fn test_invalid_events_acknowledged_but_dropped() {
    let guard = common::start_guard(common::test_config()).await;
    let http = reqwest::Client::new();
    let url = format!("{}/api/analytics/events", guard.base_url);

    let bodies = [
        json!({ "eventType": "page_view", "sessionId": "s-1", "eventData": { "pageTitle": "Home" } }),
        json!({ "eventType": "purchase", "sessionId": "s-1" }),
        json!({ "eventType": "scroll_depth" }),
    ];
    for body in &bodies {
        let res = http.post(&url).json(body).send().await.unwrap();
        assert_eq!(res.status(), 200);
        let ack: serde_json::Value = res.json().await.unwrap();
        assert_eq!(ack["success"], true);
    }

    let res = http
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let summary = common::admin_get(&guard, "/admin/analytics").await;
    assert_eq!(summary["totalEvents"], 0);
    assert_eq!(summary["totalDropped"], 4);
    assert_eq!(summary["droppedByReason"]["missing_field(pagePath)"], 1);
}
