//! Live result list shared by both discovery strategies.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::address::CanonicalKey;
use crate::candidates::CandidateStore;
use crate::types::{BackendInfo, DiscoveredBackend};

#[derive(Debug, Default)]
struct Results {
    entries: Vec<BackendInfo>,
    keys: HashSet<CanonicalKey>,
    newly_discovered: HashSet<CanonicalKey>,
}

/// Live list of found backends, written through to the candidate registry.
pub struct ResultAggregator {
    results: Mutex<Results>,
    candidates: Arc<CandidateStore>,
}

impl ResultAggregator {
    pub fn new(candidates: Arc<CandidateStore>) -> Self {
        Self {
            results: Mutex::new(Results::default()),
            candidates,
        }
    }

    /// Merge one probe result.
    ///
    /// The first entry for a canonical key keeps its slot and its display
    /// state; the address is forwarded to the candidate registry either way.
    /// Returns `true` when the entry was appended. The registry write runs on
    /// the blocking pool and has finished by the time this returns.
    pub async fn register(&self, info: BackendInfo, mark_new: bool) -> bool {
        let key = info.address.canonical_key();
        let address = info.address.clone();
        let appended = {
            let mut results = self.results.lock().await;
            if results.keys.contains(&key) {
                false
            } else {
                debug!(%key, name = %info.display_name, mark_new, "registering backend");
                if mark_new {
                    results.newly_discovered.insert(key.clone());
                }
                results.keys.insert(key);
                results.entries.push(info);
                true
            }
        };
        let candidates = self.candidates.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || candidates.add(address)).await {
            warn!(error = %e, "candidate registry write did not complete");
        }
        appended
    }

    /// Result list in arrival order, with the "new" badge resolved.
    pub async fn snapshot(&self) -> Vec<DiscoveredBackend> {
        let results = self.results.lock().await;
        results
            .entries
            .iter()
            .map(|info| DiscoveredBackend {
                is_new: results
                    .newly_discovered
                    .contains(&info.address.canonical_key()),
                info: info.clone(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
