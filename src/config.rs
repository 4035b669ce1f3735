use std::time::Duration;

/// Port assumed when an address does not name one.
pub const DEFAULT_PORT: u16 = 3000;
/// Hard deadline for a single probe, including reading the body.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1200);
/// Minimum interval between two debounced probes of the same address.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(3000);
/// Concurrent workers used by a subnet sweep.
pub const SCAN_WORKERS: usize = 30;

/// Tunables for a discovery session.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub probe_timeout: Duration,
    pub debounce_window: Duration,
    pub scan_workers: usize,
    /// Host the client itself runs on; seeds quick discovery.
    pub self_host: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_timeout: PROBE_TIMEOUT,
            debounce_window: DEBOUNCE_WINDOW,
            scan_workers: SCAN_WORKERS,
            self_host: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_self_host(mut self, host: impl Into<String>) -> Self {
        self.self_host = Some(host.into());
        self
    }
}
