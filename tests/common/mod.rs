//! Shared utilities for integration testing.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use storefront_guard::config::GuardConfig;
use storefront_guard::{HttpServer, Shutdown};

pub const ADMIN_KEY: &str = "integration-admin-key";

/// A guard instance listening on an ephemeral local port.
pub struct TestGuard {
    pub base_url: String,
    pub shutdown: Shutdown,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults with a known admin key.
pub fn test_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

/// Start the guard with `config` and wait until it accepts connections.
pub async fn start_guard(config: GuardConfig) -> TestGuard {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (_updates_tx, updates_rx) = mpsc::unbounded_channel();

    let server = HttpServer::new(config);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, &server_shutdown).await;
    });

    let base_url = format!("http://{}", addr);
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client.get(format!("{}/health", base_url)).send().await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    TestGuard { base_url, shutdown }
}

/// GET an admin endpoint with the bearer key and parse the JSON body.
#[allow(dead_code)]
pub async fn admin_get(guard: &TestGuard, path: &str) -> serde_json::Value {
    let res = reqwest::Client::new()
        .get(format!("{}{}", guard.base_url, path))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200, "admin request to {} failed", path);
    res.json().await.unwrap()
}
