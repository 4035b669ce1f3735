//! Single-target liveness check against a backend's setup info endpoint.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::address::Address;
use crate::error::Result;
use crate::types::BackendInfo;

/// Something that can tell whether a backend answers at an address.
///
/// Implementations swallow every failure: a timeout, refused connection,
/// non-success status or unreadable body all come back as `None`.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, address: &Address) -> impl Future<Output = Option<BackendInfo>> + Send;
}

/// Probes `GET {address}/api/setup/info` over HTTP with a hard deadline.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    async fn fetch_info(&self, address: &Address) -> reqwest::Result<Option<Value>> {
        let resp = self.client.get(address.info_url()).send().await?;
        if !resp.status().is_success() {
            debug!(%address, status = %resp.status(), "backend answered with failure status");
            return Ok(None);
        }
        resp.json::<Value>().await.map(Some)
    }
}

impl Probe for HttpProber {
    async fn probe(&self, address: &Address) -> Option<BackendInfo> {
        match time::timeout(self.timeout, self.fetch_info(address)).await {
            Ok(Ok(Some(body))) => {
                let info = decode_info(address, &body);
                debug!(%address, name = %info.display_name, initialized = info.initialized, "backend found");
                Some(info)
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                debug!(%address, error = %e, "probe failed");
                None
            }
            Err(_) => {
                debug!(%address, timeout_ms = self.timeout.as_millis() as u64, "probe timed out");
                None
            }
        }
    }
}

/// Decode a setup info body without trusting its shape.
///
/// `name` is used only when it is a string; `initialized` follows the usual
/// truthiness rules and defaults to false.
pub fn decode_info(address: &Address, body: &Value) -> BackendInfo {
    let display_name = body
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| address.to_string());
    let initialized = body.get("initialized").is_some_and(is_truthy);
    BackendInfo {
        address: address.clone(),
        display_name,
        initialized,
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Time of the last debounced probe per address. Entries are never pruned.
#[derive(Debug, Default)]
pub struct ProbeLedger {
    last_probe: Mutex<HashMap<Address, Instant>>,
}

impl ProbeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt at `now` unless one was recorded within `window`.
    ///
    /// Returns `true` when the caller should go ahead and probe. Check and
    /// record happen under one lock so overlapping callers cannot both win.
    pub fn try_claim(&self, address: &Address, now: Instant, window: Duration) -> bool {
        let mut last_probe = self.last_probe.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(&last) = last_probe.get(address) {
            if now.saturating_duration_since(last) < window {
                return false;
            }
        }
        last_probe.insert(address.clone(), now);
        true
    }

    pub fn last_probe(&self, address: &Address) -> Option<Instant> {
        let last_probe = self.last_probe.lock().unwrap_or_else(|p| p.into_inner());
        last_probe.get(address).copied()
    }
}
