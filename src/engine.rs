//! Discovery orchestration: quick checks of likely addresses and full /24 sweeps.
//!
//! Both strategies run their probes through [`BoundedExecutor`]; quick
//! discovery fans out to every target at once and honours the per-address
//! debounce, a sweep uses a fixed pool of workers and probes every host
//! unconditionally.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::address::{normalize, Address, CanonicalKey};
use crate::aggregate::ResultAggregator;
use crate::candidates::CandidateStore;
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::executor::BoundedExecutor;
use crate::netdetect::SubnetPrefix;
use crate::probe::{Probe, ProbeLedger};
use crate::storage::{KeyValueStore, KEY_BACKEND_NAME, KEY_BACKEND_URL, SESSION_KEYS};
use crate::types::{BackendInfo, DiscoveredBackend, ScanProgress};

/// Where the client should go after selecting a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Login,
    Initialize,
}

/// State of one running subnet sweep.
#[derive(Debug)]
pub struct ScanSession {
    prefix: SubnetPrefix,
    total: usize,
    completed: AtomicUsize,
    found: Mutex<Vec<BackendInfo>>,
    found_keys: Mutex<HashSet<CanonicalKey>>,
}

impl ScanSession {
    fn new(prefix: SubnetPrefix, total: usize) -> Self {
        Self {
            prefix,
            total,
            completed: AtomicUsize::new(0),
            found: Mutex::new(Vec::new()),
            found_keys: Mutex::new(HashSet::new()),
        }
    }

    async fn record(&self, info: &BackendInfo) {
        let mut keys = self.found_keys.lock().await;
        if keys.insert(info.address.canonical_key()) {
            self.found.lock().await.push(info.clone());
        }
    }

    async fn finish(&self) -> ScanSummary {
        ScanSummary {
            network: self.prefix.network(),
            total: self.total,
            completed: self.completed.load(Ordering::SeqCst),
            found: self.found.lock().await.clone(),
        }
    }
}

/// Outcome of a finished sweep; `found` is in discovery order.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub network: Ipv4Net,
    pub total: usize,
    pub completed: usize,
    pub found: Vec<BackendInfo>,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.found.is_empty() {
            return write!(f, "No backends found on {}", self.network);
        }
        let names: Vec<&str> = self.found.iter().map(|b| b.display_name.as_str()).collect();
        write!(
            f,
            "Found {} backend(s) on {}: {}",
            self.found.len(),
            self.network,
            names.join(", ")
        )
    }
}

pub struct DiscoveryEngine<P: Probe> {
    config: DiscoveryConfig,
    prober: Arc<P>,
    ledger: Arc<ProbeLedger>,
    candidates: Arc<CandidateStore>,
    results: Arc<ResultAggregator>,
    storage: Arc<dyn KeyValueStore>,
    progress: Arc<watch::Sender<ScanProgress>>,
}

impl<P: Probe> DiscoveryEngine<P> {
    /// Engine with a fresh probe ledger and the candidate registry from `storage`.
    pub fn new(config: DiscoveryConfig, prober: P, storage: Arc<dyn KeyValueStore>) -> Self {
        let candidates = Arc::new(CandidateStore::open(storage.clone()));
        Self::from_parts(
            config,
            Arc::new(prober),
            Arc::new(ProbeLedger::new()),
            candidates,
            storage,
        )
    }

    pub fn from_parts(
        config: DiscoveryConfig,
        prober: Arc<P>,
        ledger: Arc<ProbeLedger>,
        candidates: Arc<CandidateStore>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (progress, _) = watch::channel(ScanProgress::idle());
        Self {
            config,
            prober,
            ledger,
            results: Arc::new(ResultAggregator::new(candidates.clone())),
            candidates,
            storage,
            progress: Arc::new(progress),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn candidates(&self) -> &CandidateStore {
        &self.candidates
    }

    pub fn ledger(&self) -> &ProbeLedger {
        &self.ledger
    }

    /// Found backends in arrival order.
    pub async fn results(&self) -> Vec<DiscoveredBackend> {
        self.results.snapshot().await
    }

    /// Live sweep progress; `0/0` while no sweep runs.
    pub fn progress(&self) -> ScanProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    /// Address of the currently selected backend, if any.
    pub fn saved_backend(&self) -> Option<Address> {
        match self.storage.get(KEY_BACKEND_URL) {
            Ok(Some(url)) if !url.is_empty() => Some(Address::from_raw(url)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "failed to read selected backend");
                None
            }
        }
    }

    /// Addresses checked by quick discovery, normalized and deduplicated.
    ///
    /// Seeds are the client's own host, both loopback spellings, the selected
    /// backend and every registered candidate. Invalid seeds are dropped.
    pub fn quick_targets(&self) -> Vec<Address> {
        let mut raw: Vec<String> = Vec::new();
        if let Some(host) = self.config.self_host.as_deref().filter(|h| !h.is_empty()) {
            raw.push(host.to_string());
        }
        raw.push("localhost".to_string());
        raw.push("127.0.0.1".to_string());
        if let Some(saved) = self.saved_backend() {
            raw.push(saved.to_string());
        }
        raw.extend(self.candidates.list().into_iter().map(|a| a.to_string()));

        let mut seen = HashSet::new();
        raw.iter()
            .filter_map(|r| normalize(r))
            .filter(|a| seen.insert(a.clone()))
            .collect()
    }

    /// Probe every quick target at once and return the result list.
    ///
    /// Addresses probed within the debounce window are skipped. There is no
    /// failure state: whatever answered is registered.
    pub async fn quick_discover(&self) -> Vec<DiscoveredBackend> {
        let targets = self.quick_targets();
        info!(targets = targets.len(), "starting quick discovery");

        let prober = self.prober.clone();
        let ledger = self.ledger.clone();
        let results = self.results.clone();
        let window = self.config.debounce_window;
        BoundedExecutor::unbounded()
            .run(
                targets,
                move |address: Address| {
                    let prober = prober.clone();
                    let ledger = ledger.clone();
                    let results = results.clone();
                    async move {
                        if let Some(info) =
                            probe_debounced(prober.as_ref(), &ledger, &address, window).await
                        {
                            results.register(info, false).await;
                        }
                    }
                },
                |_| {},
            )
            .await;

        let found = self.results.snapshot().await;
        info!(found = found.len(), "quick discovery finished");
        found
    }

    /// Check a user-supplied address through the debounced path.
    ///
    /// Malformed input is rejected before any network activity.
    pub async fn add_manual(&self, input: &str) -> Result<Option<BackendInfo>> {
        let address =
            normalize(input).ok_or_else(|| DiscoveryError::InvalidAddress(input.trim().to_string()))?;
        let window = self.config.debounce_window;
        let found = probe_debounced(self.prober.as_ref(), &self.ledger, &address, window).await;
        match &found {
            Some(info) => {
                self.results.register(info.clone(), false).await;
            }
            None => info!(%address, "no backend answered"),
        }
        Ok(found)
    }

    /// Sweep `{prefix}.1` through `{prefix}.255` on port 3000.
    ///
    /// The prefix is validated first; a malformed one is rejected without a
    /// single probe being sent.
    pub async fn scan_subnet(&self, prefix: &str) -> Result<ScanSummary> {
        let prefix: SubnetPrefix = prefix.trim().parse()?;
        Ok(self.scan_prefix(prefix).await)
    }

    /// Sweep an already validated prefix with the bounded worker pool.
    ///
    /// Overlapping sweeps are not rejected. They share one progress channel:
    /// a new sweep resets the counters to `0/255`, and whichever finishes
    /// first sets them back to idle while the other is still running.
    pub async fn scan_prefix(&self, prefix: SubnetPrefix) -> ScanSummary {
        let targets = prefix.sweep_targets();
        let session = Arc::new(ScanSession::new(prefix, targets.len()));
        self.progress.send_replace(ScanProgress {
            completed: 0,
            total: session.total,
        });
        info!(
            network = %prefix.network(),
            workers = self.config.scan_workers,
            "starting subnet scan"
        );

        let prober = self.prober.clone();
        let results = self.results.clone();
        let op_session = session.clone();
        let op = move |address: Address| {
            let prober = prober.clone();
            let results = results.clone();
            let session = op_session.clone();
            async move {
                if let Some(info) = prober.probe(&address).await {
                    session.record(&info).await;
                    results.register(info, true).await;
                }
            }
        };

        let progress = self.progress.clone();
        let progress_session = session.clone();
        let on_progress = move |_done: usize| {
            progress_session.completed.fetch_add(1, Ordering::SeqCst);
            progress.send_modify(|p| p.completed += 1);
        };

        BoundedExecutor::bounded(self.config.scan_workers)
            .run(targets, op, on_progress)
            .await;

        let summary = session.finish().await;
        self.progress.send_replace(ScanProgress::idle());
        info!(found = summary.found.len(), "{summary}");
        summary
    }

    /// Make `info` the selected backend and drop the previous login session.
    pub fn select_backend(&self, info: &BackendInfo) -> Result<NextStep> {
        self.storage.set(KEY_BACKEND_URL, info.address.as_str())?;
        self.storage.set(KEY_BACKEND_NAME, &info.display_name)?;
        for key in SESSION_KEYS {
            self.storage.remove(key)?;
        }
        info!(address = %info.address, name = %info.display_name, "backend selected");
        Ok(if info.initialized {
            NextStep::Login
        } else {
            NextStep::Initialize
        })
    }
}

/// Probe unless the same address was probed within `window`.
///
/// The attempt is recorded before the request goes out so overlapping
/// discovery passes do not pile up on one address.
async fn probe_debounced<P: Probe>(
    prober: &P,
    ledger: &ProbeLedger,
    address: &Address,
    window: Duration,
) -> Option<BackendInfo> {
    if !ledger.try_claim(address, Instant::now(), window) {
        debug!(%address, "probe skipped, checked recently");
        return None;
    }
    prober.probe(address).await
}
