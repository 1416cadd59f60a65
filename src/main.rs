//! Storefront guard service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ request id → trace → timeout → body limit
//!                      → client context (ip, user agent, session)
//!                      → rate limit (per endpoint class)      429
//!                      → guard: csrf → honeypot → schema
//!                               → spam → sanitize             400
//!                      → submission store / mailer
//!     ◀───────────── security headers on every response
//!
//!     POST /api/analytics/events → ingest → sinks → /admin/analytics
//! ```
//!
//! Usage: `storefront-guard [config.toml]`. Without a path the built-in
//! defaults are used and hot reload is off.

use std::path::PathBuf;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use storefront_guard::config::{load_config, watcher::ConfigWatcher, GuardConfig};
use storefront_guard::lifecycle::signals;
use storefront_guard::observability::{logging, metrics};
use storefront_guard::{HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "storefront-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        config = ?config_path,
        rate_limit_enabled = config.rate_limit.enabled,
        csrf_bound = config.csrf.bind_to_session,
        production = config.security.production,
        "Configuration loaded"
    );
    if config.admin.enabled && config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
        tracing::warn!("Admin API key is the default placeholder");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_shutdown_listener(shutdown.clone());

    // The watcher handle must outlive the server.
    let (config_updates, _watcher) = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            signals::spawn_reload_listener(path.clone(), watcher.sender(), &shutdown);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher failed to start, hot reload disabled");
                    (updates, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config);
    server.run(listener, config_updates, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
