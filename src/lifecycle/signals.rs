//! OS signal handling.
//!
//! SIGINT and SIGTERM trigger graceful shutdown. On Unix, SIGHUP re-reads the
//! configuration file and feeds it through the same channel as the file
//! watcher; an invalid file is logged and ignored.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::config::{load_config, GuardConfig};
use crate::lifecycle::Shutdown;

/// Resolve once SIGINT or (on Unix) SIGTERM arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }
}

/// Trigger `shutdown` on the first termination signal.
pub fn spawn_shutdown_listener(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    })
}

/// Reload `path` on every SIGHUP until shutdown.
#[cfg(unix)]
pub fn spawn_reload_listener(
    path: PathBuf,
    updates: mpsc::UnboundedSender<GuardConfig>,
    shutdown: &Shutdown,
) -> tokio::task::JoinHandle<()> {
    let mut shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGHUP");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = hangup.recv() => match load_config(&path) {
                    Ok(config) => {
                        tracing::info!(path = ?path, "SIGHUP received, configuration reloaded");
                        let _ = updates.send(config);
                    }
                    Err(e) => tracing::error!(error = %e, "SIGHUP reload failed, keeping current configuration"),
                },
                _ = shutdown.recv() => break,
            }
        }
    })
}

#[cfg(not(unix))]
pub fn spawn_reload_listener(
    _path: PathBuf,
    _updates: mpsc::UnboundedSender<GuardConfig>,
    _shutdown: &Shutdown,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {})
}
