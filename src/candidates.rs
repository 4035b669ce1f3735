//! Registry of backend addresses seen before, kept across runs.
//!
//! The registry holds at most one address per [`CanonicalKey`]. Iteration
//! order is the order each key was first inserted; the stored spelling is the
//! most recent one added for that key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::address::{Address, CanonicalKey};
use crate::error::Result;
use crate::storage::{KeyValueStore, KEY_CANDIDATES};

pub struct CandidateStore {
    storage: Arc<dyn KeyValueStore>,
    entries: Mutex<Vec<Address>>,
}

impl CandidateStore {
    /// Open the registry, seeding the in-memory list from persisted storage.
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Self {
        let entries = load(storage.as_ref());
        debug!(count = entries.len(), "loaded backend candidates");
        Self {
            storage,
            entries: Mutex::new(entries),
        }
    }

    /// Current registry contents in first-seen order.
    pub fn list(&self) -> Vec<Address> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Record an address, replacing the spelling of an equivalent entry in place.
    ///
    /// Persistence failures are logged; the in-memory registry is still updated.
    ///
    /// Blocks on storage I/O; async callers should run it via `spawn_blocking`.
    pub fn add(&self, address: Address) {
        // Rebuild and persist under one guard so storage never lags a newer list.
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.push(address);
        *entries = dedup_by_key(std::mem::take(&mut *entries));
        if let Err(e) = persist(self.storage.as_ref(), &entries) {
            warn!(error = %e, "failed to persist backend candidates");
        }
    }
}

/// Read the persisted list. Missing or malformed data yields an empty list;
/// empty and non-string entries are dropped.
pub fn load(storage: &dyn KeyValueStore) -> Vec<Address> {
    let raw = match storage.get(KEY_CANDIDATES) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "failed to read backend candidates");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.is_empty() => Some(Address::from_raw(s)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Write the list to persisted storage as a JSON array of strings.
pub fn persist(storage: &dyn KeyValueStore, list: &[Address]) -> Result<()> {
    let json = serde_json::to_string(list)?;
    storage.set(KEY_CANDIDATES, &json)
}

/// First-seen position, last-seen value.
fn dedup_by_key(list: Vec<Address>) -> Vec<Address> {
    let mut slots: HashMap<CanonicalKey, usize> = HashMap::new();
    let mut out: Vec<Address> = Vec::with_capacity(list.len());
    for address in list {
        let key = address.canonical_key();
        match slots.get(&key) {
            Some(&idx) => out[idx] = address,
            None => {
                slots.insert(key, out.len());
                out.push(address);
            }
        }
    }
    out
}
