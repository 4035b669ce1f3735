use serde::{Deserialize, Serialize};

use crate::address::Address;

/// A backend that answered its setup info endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub address: Address,
    /// Name reported by the backend, or the address when it reported none.
    pub display_name: String,
    pub initialized: bool,
}

/// One row of the live result list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredBackend {
    #[serde(flatten)]
    pub info: BackendInfo,
    /// Found by a subnet sweep rather than already known.
    pub is_new: bool,
}

/// Progress counters of the running subnet sweep; `0/0` while idle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub completed: usize,
    pub total: usize,
}

impl ScanProgress {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.total > 0
    }
}

/// JSON document written by `--output`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DiscoveryReport {
    pub generated_at: String,
    pub backends: Vec<DiscoveredBackend>,
}
