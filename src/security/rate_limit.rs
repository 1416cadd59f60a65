//! Sliding-window rate limiting per endpoint class.
//!
//! Each client key keeps the timestamps of its admitted requests. A check
//! drops timestamps older than the window, rejects when the remaining count
//! has reached the quota, and otherwise records the new request. Rejected
//! attempts are not recorded, so hammering a closed endpoint does not extend
//! the lockout.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::config::{RateLimitConfig, RateLimitPresets};
use crate::error::GuardError;
use crate::http::request::ClientContext;
use crate::observability::metrics;
use crate::security::audit::{AuditLog, SecurityEvent, SecurityEventKind};
use crate::security::store::RateLimitStore;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Endpoint classes with their own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitClass {
    Auth,
    Api,
    Upload,
    Contact,
    Newsletter,
}

impl RateLimitClass {
    pub const ALL: [RateLimitClass; 5] = [
        RateLimitClass::Auth,
        RateLimitClass::Api,
        RateLimitClass::Upload,
        RateLimitClass::Contact,
        RateLimitClass::Newsletter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitClass::Auth => "auth",
            RateLimitClass::Api => "api",
            RateLimitClass::Upload => "upload",
            RateLimitClass::Contact => "contact",
            RateLimitClass::Newsletter => "newsletter",
        }
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which a slot frees up.
    pub reset_at_ms: u64,
}

impl RateLimitDecision {
    /// Whole seconds until `reset_at_ms`, never less than one.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        let wait_ms = self.reset_at_ms.saturating_sub(now_ms);
        wait_ms.div_ceil(1000).max(1)
    }

    /// Attach the `X-RateLimit-*` headers. Reset is in epoch seconds.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(
            X_RATELIMIT_RESET,
            HeaderValue::from(self.reset_at_ms.div_ceil(1000)),
        );
    }
}

/// The windowing algorithm over an injected store and clock.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Check and, if admitted, record a request for `key`.
    pub fn check(&self, key: &str, window_ms: u64, max: u32) -> RateLimitDecision {
        let now = self.clock.now_millis();
        let window_start = now.saturating_sub(window_ms);

        let mut decision = RateLimitDecision {
            allowed: false,
            limit: max,
            remaining: 0,
            reset_at_ms: now + window_ms,
        };

        self.store.update(key, &mut |record| {
            record.prune(window_start);
            record.window_ms = window_ms;

            let count = record.timestamps.len() as u64;
            if count >= u64::from(max) {
                return;
            }

            record.timestamps.push_back(now);
            let oldest = record.timestamps.front().copied().unwrap_or(now);
            decision = RateLimitDecision {
                allowed: true,
                limit: max,
                remaining: (u64::from(max) - count - 1) as u32,
                reset_at_ms: oldest + window_ms,
            };
        });

        decision
    }

    /// Prune every record against its own window and evict empty ones.
    /// Returns the number of evicted keys.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.store.len();
        self.store.retain(&mut |_, record| {
            record.prune(now.saturating_sub(record.window_ms));
            !record.is_empty()
        });
        before.saturating_sub(self.store.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}

/// Shared rate limiting state: the limiter plus hot-reloadable presets.
pub struct RateLimiterState {
    limiter: SlidingWindowLimiter,
    presets: ArcSwap<RateLimitPresets>,
    enabled: bool,
    audit: AuditLog,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig, limiter: SlidingWindowLimiter, audit: AuditLog) -> Self {
        Self {
            limiter,
            presets: ArcSwap::from_pointee(config.presets.clone()),
            enabled: config.enabled,
            audit,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Check `client` against the quota of `class`.
    pub fn check_class(&self, class: RateLimitClass, client: &str) -> RateLimitDecision {
        let window = self.presets.load().for_class(class);
        let key = format!("{}:{}", class.as_str(), client);
        self.limiter.check(&key, window.window_ms, window.max)
    }

    pub fn presets(&self) -> Arc<RateLimitPresets> {
        self.presets.load_full()
    }

    pub fn update_presets(&self, presets: RateLimitPresets) {
        tracing::info!(?presets, "Rate limit presets updated");
        self.presets.store(Arc::new(presets));
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    /// Run the global sweep until shutdown.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = self.limiter.sweep();
                        let tracked = self.limiter.tracked_keys();
                        metrics::record_rate_limit_keys(tracked);
                        if evicted > 0 {
                            tracing::debug!(evicted, tracked, "Rate limit sweep");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}

/// Per-route middleware state.
#[derive(Clone)]
pub struct RateLimitLayer {
    pub state: Arc<RateLimiterState>,
    pub class: RateLimitClass,
}

impl RateLimitLayer {
    pub fn new(state: Arc<RateLimiterState>, class: RateLimitClass) -> Self {
        Self { state, class }
    }
}

/// Middleware function for class-based rate limiting.
pub async fn rate_limit_middleware(
    State(layer): State<RateLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let state = &layer.state;
    if !state.enabled() {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ClientContext>()
        .cloned()
        .unwrap_or_default();

    let decision = state.check_class(layer.class, &client.ip);
    if decision.allowed {
        let mut response = next.run(request).await;
        decision.apply_headers(response.headers_mut());
        return response;
    }

    tracing::warn!(
        client = %client.ip,
        class = layer.class.as_str(),
        limit = decision.limit,
        "Rate limit exceeded"
    );
    metrics::record_rate_limited(layer.class.as_str());
    state.audit.record(SecurityEvent::new(
        SecurityEventKind::RateLimitExceeded,
        &client,
        json!({ "class": layer.class.as_str(), "limit": decision.limit }),
    ));

    let retry_after_secs = decision.retry_after_secs(state.limiter.now_millis());
    let mut response = GuardError::RateLimitExceeded { retry_after_secs }.into_response();
    decision.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{AuditConfig, WindowConfig};
    use crate::security::store::InMemoryStore;

    const START: u64 = 1_700_000_000_000;

    fn limiter() -> (SlidingWindowLimiter, ManualClock) {
        let clock = ManualClock::new(START);
        let limiter = SlidingWindowLimiter::new(Arc::new(InMemoryStore::new()), Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn test_first_request_allowed() {
        let (limiter, _) = limiter();
        let decision = limiter.check("new", 1000, 1);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at_ms, START + 1000);
    }

    #[test]
    fn test_max_allowed_then_rejected() {
        let (limiter, clock) = limiter();
        for i in 0..5 {
            let d = limiter.check("ip", 900_000, 5);
            assert!(d.allowed, "request {} should be allowed", i + 1);
            assert_eq!(d.remaining, 4 - i);
            clock.advance_millis(10);
        }

        let sixth = limiter.check("ip", 900_000, 5);
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.reset_at_ms, clock.now_millis() + 900_000);
    }

    #[test]
    fn test_rejected_attempts_not_recorded() {
        let (limiter, clock) = limiter();
        limiter.check("ip", 1000, 1);
        for _ in 0..10 {
            clock.advance_millis(50);
            assert!(!limiter.check("ip", 1000, 1).allowed);
        }

        // Only the admitted request at START counts; it leaves the window at START + 1000.
        clock.set_millis(START + 1000);
        assert!(limiter.check("ip", 1000, 1).allowed);
    }

    #[test]
    fn test_sliding_window_recovery() {
        let (limiter, clock) = limiter();
        // Three requests at t=0, t=400, t=800 with max=3 over 1000ms.
        assert!(limiter.check("ip", 1000, 3).allowed);
        clock.advance_millis(400);
        assert!(limiter.check("ip", 1000, 3).allowed);
        clock.advance_millis(400);
        assert!(limiter.check("ip", 1000, 3).allowed);
        assert!(!limiter.check("ip", 1000, 3).allowed);

        // At t=1000 the first request slides out; the later two still count.
        clock.set_millis(START + 1000);
        let d = limiter.check("ip", 1000, 3);
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(!limiter.check("ip", 1000, 3).allowed);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter();
        assert!(limiter.check("a", 1000, 1).allowed);
        assert!(!limiter.check("a", 1000, 1).allowed);
        assert!(limiter.check("b", 1000, 1).allowed);
    }

    #[test]
    fn test_sweep_evicts_expired_keys() {
        let (limiter, clock) = limiter();
        limiter.check("short", 1000, 5);
        limiter.check("long", 60_000, 5);
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance_millis(1500);
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys(), 1);

        clock.advance_millis(60_000);
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let d = RateLimitDecision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_at_ms: 10_500,
        };
        assert_eq!(d.retry_after_secs(10_000), 1);
        assert_eq!(d.retry_after_secs(8_000), 3);
        assert_eq!(d.retry_after_secs(20_000), 1);
    }

    #[tokio::test]
    async fn test_class_presets_and_reload() {
        let (limiter, _) = limiter();
        let audit = AuditLog::new(&AuditConfig::default());
        let state = RateLimiterState::new(&RateLimitConfig::default(), limiter, audit);

        for _ in 0..5 {
            assert!(state.check_class(RateLimitClass::Auth, "1.2.3.4").allowed);
        }
        let sixth = state.check_class(RateLimitClass::Auth, "1.2.3.4");
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);

        // A different class for the same client has its own quota.
        assert!(state.check_class(RateLimitClass::Api, "1.2.3.4").allowed);

        let mut presets = RateLimitPresets::default();
        presets.api = WindowConfig::new(1000, 1);
        state.update_presets(presets);
        assert!(!state.check_class(RateLimitClass::Api, "1.2.3.4").allowed);
    }
}
