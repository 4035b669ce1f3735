#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Json, Router};
use backend_scout::{Address, BackendInfo, Probe};
use serde_json::{json, Value};

/// Probe stand-in answering from a fixed table and recording every call.
#[derive(Default)]
pub struct FakeProber {
    live: HashMap<Address, BackendInfo>,
    calls: Mutex<Vec<Address>>,
    delay: Option<Duration>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, address: &str, name: &str, initialized: bool) -> Self {
        let address = Address::from_raw(address);
        self.live.insert(
            address.clone(),
            BackendInfo {
                address,
                display_name: name.to_string(),
                initialized,
            },
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Address> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.as_str() == address)
            .count()
    }
}

impl Probe for FakeProber {
    async fn probe(&self, address: &Address) -> Option<BackendInfo> {
        self.calls.lock().unwrap().push(address.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.live.get(address).cloned()
    }
}

/// Spawn an axum app on an ephemeral loopback port.
pub async fn spawn_app(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A backend whose setup info endpoint answers with `body`.
pub async fn spawn_backend(body: Value) -> SocketAddr {
    let app = Router::new().route(
        "/api/setup/info",
        get(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    spawn_app(app).await
}

/// A backend that takes `delay` before answering.
pub async fn spawn_slow_backend(delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/api/setup/info",
        get(move || async move {
            tokio::time::sleep(delay).await;
            Json(json!({"name": "slow", "initialized": true}))
        }),
    );
    spawn_app(app).await
}

/// A backend whose setup info endpoint fails with `status`.
pub async fn spawn_failing_backend(status: StatusCode) -> SocketAddr {
    let app = Router::new().route("/api/setup/info", get(move || async move { status }));
    spawn_app(app).await
}

/// A backend answering with a body that is not JSON.
pub async fn spawn_garbage_backend() -> SocketAddr {
    let app = Router::new().route("/api/setup/info", get(|| async { "<html>hello</html>" }));
    spawn_app(app).await
}

pub fn origin(addr: SocketAddr) -> Address {
    Address::from_raw(format!("http://{addr}"))
}
