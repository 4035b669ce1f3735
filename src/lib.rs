//! Library crate for backend-scout exposing reusable modules.
pub mod address;
pub mod aggregate;
pub mod candidates;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod netdetect;
pub mod probe;
pub mod server;
pub mod storage;
pub mod types;

pub use address::{canonical_key, normalize, Address, CanonicalKey};
pub use config::DiscoveryConfig;
pub use engine::{DiscoveryEngine, NextStep, ScanSummary};
pub use error::{DiscoveryError, Result};
pub use probe::{HttpProber, Probe, ProbeLedger};
pub use types::{BackendInfo, DiscoveredBackend, ScanProgress};
