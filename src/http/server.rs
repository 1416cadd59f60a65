//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build shared state for all handlers
//! - Create the Axum router with per-route rate-limit classes
//! - Wire up middleware (request id, tracing, timeout, body limit,
//!   client context, security headers)
//! - Run background sweeps and apply hot-reloaded policy
//! - Serve until the shutdown broadcast fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::analytics::{EventIngestor, JsonlEventSink};
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{LoggingMailer, LoggingSubmissionStore, Mailer, SubmissionStore};
use crate::config::GuardConfig;
use crate::http::handlers;
use crate::http::request::{client_context_middleware, ClientContextConfig};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::security::csrf::CsrfProtection;
use crate::security::headers::apply_security_headers;
use crate::security::rate_limit::{rate_limit_middleware, RateLimitLayer};
use crate::security::spam::SpamFilter;
use crate::security::{
    AuditLog, InMemoryStore, RateLimitClass, RateLimitStore, RateLimiterState, RequestGuard,
    SlidingWindowLimiter,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GuardConfig>,
    pub rate_limiter: Arc<RateLimiterState>,
    pub guard: Arc<RequestGuard>,
    pub audit: AuditLog,
    pub analytics: Arc<EventIngestor>,
    pub store: Arc<dyn SubmissionStore>,
    pub mailer: Arc<dyn Mailer>,
    pub started_at: Instant,
}

/// Collaborators and infrastructure the server is built from.
pub struct Components {
    pub clock: Arc<dyn Clock>,
    pub rate_limit_store: Arc<dyn RateLimitStore>,
    pub store: Arc<dyn SubmissionStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            rate_limit_store: Arc::new(InMemoryStore::new()),
            store: Arc::new(LoggingSubmissionStore),
            mailer: Arc::new(LoggingMailer),
        }
    }
}

impl AppState {
    pub fn new(config: GuardConfig, components: Components) -> Self {
        let audit = AuditLog::new(&config.audit);

        let limiter = SlidingWindowLimiter::new(components.rate_limit_store, components.clock.clone());
        let rate_limiter = Arc::new(RateLimiterState::new(&config.rate_limit, limiter, audit.clone()));

        let csrf = Arc::new(CsrfProtection::new(config.csrf.clone(), components.clock.clone()));
        let guard = Arc::new(RequestGuard::new(
            csrf,
            SpamFilter::from_config(&config.spam),
            config.security.honeypot_field.clone(),
            audit.clone(),
        ));

        let mut analytics = EventIngestor::new(&config.analytics, components.clock);
        if let Some(path) = &config.analytics.log_path {
            match JsonlEventSink::new(path) {
                Ok(sink) => analytics = analytics.with_sink(Arc::new(sink)),
                Err(e) => tracing::error!(error = %e, "Analytics file sink disabled"),
            }
        }

        Self {
            config: Arc::new(config),
            rate_limiter,
            guard,
            audit,
            analytics: Arc::new(analytics),
            store: components.store,
            mailer: components.mailer,
            started_at: Instant::now(),
        }
    }

    /// Swap in the hot-reloadable parts of `config`.
    ///
    /// Listener, CSRF and admin settings need a restart.
    pub fn apply_reload(&self, config: &GuardConfig) {
        self.rate_limiter.update_presets(config.rate_limit.presets.clone());
        self.guard.update_spam_filter(SpamFilter::from_config(&config.spam));
    }
}

/// HTTP server for the guard service.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with log-only collaborators.
    pub fn new(config: GuardConfig) -> Self {
        Self::with_components(config, Components::default())
    }

    pub fn with_components(config: GuardConfig, components: Components) -> Self {
        let state = AppState::new(config, components);
        let router = build_router(state.clone());
        Self { router, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GuardConfig>,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let config = self.state.config.clone();
        let sweep_interval = Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1));
        self.state
            .rate_limiter
            .clone()
            .spawn_sweeper(sweep_interval, shutdown.subscribe());
        spawn_csrf_sweeper(self.state.guard.clone(), sweep_interval, shutdown.subscribe());

        let reload_state = self.state.clone();
        let mut reload_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(new_config) => {
                            reload_state.apply_reload(&new_config);
                            tracing::info!("Configuration reloaded");
                        }
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut serve_shutdown = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = serve_shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let limiter = state.rate_limiter.clone();
    let limit = |class: RateLimitClass| {
        middleware::from_fn_with_state(RateLimitLayer::new(limiter.clone(), class), rate_limit_middleware)
    };

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/csrf-token", get(handlers::csrf_token).layer(limit(RateLimitClass::Api)))
        .route("/api/auth/login", post(handlers::login).layer(limit(RateLimitClass::Auth)))
        .route("/api/auth/register", post(handlers::register).layer(limit(RateLimitClass::Auth)))
        .route("/api/contact", post(handlers::contact).layer(limit(RateLimitClass::Contact)))
        .route("/api/newsletter", post(handlers::newsletter).layer(limit(RateLimitClass::Newsletter)))
        .route("/api/appointments", post(handlers::appointment).layer(limit(RateLimitClass::Api)))
        .route("/api/uploads", post(handlers::upload).layer(limit(RateLimitClass::Upload)))
        .route("/api/analytics/events", post(handlers::ingest_event));

    if config.admin.enabled {
        router = router.merge(setup_admin_router(state.clone()));
    }

    let router = router
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            ClientContextConfig {
                trusted_proxies: config.rate_limit.trust_forwarded_for.then(|| {
                    config
                        .rate_limit
                        .trusted_proxies
                        .iter()
                        .filter_map(|ip| ip.parse().ok())
                        .collect()
                }),
            },
            client_context_middleware,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    apply_security_headers(router, &config.security)
}

async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

fn spawn_csrf_sweeper(
    guard: Arc<RequestGuard>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = guard.csrf().sweep();
                    if removed > 0 {
                        tracing::debug!(removed, "Expired CSRF tokens swept");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}
