use std::fmt;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::config::DEFAULT_PORT;

/// A backend origin in normalized form: `scheme://host:port`, no path or query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a string that is already an origin without re-normalizing it.
    ///
    /// Used for values coming back from persisted storage, which keep the
    /// spelling they were saved with.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Identity of this address for deduplication purposes.
    pub fn canonical_key(&self) -> CanonicalKey {
        canonical_key(&self.0)
    }

    /// URL of the setup info endpoint on this backend.
    pub fn info_url(&self) -> String {
        format!("{}/api/setup/info", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `host:port` identity of a backend; loopback spellings collapse to `local:port`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Turn free-form user input into a canonical origin.
///
/// - leading/trailing whitespace is ignored
/// - a missing `http://` or `https://` prefix defaults to `http://`
/// - a missing port defaults to 3000
/// - path, query and fragment are dropped
///
/// Returns `None` when the input is empty or does not parse as a URL.
pub fn normalize(input: &str) -> Option<Address> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let mut url = Url::parse(&with_scheme).ok()?;
    url.host()?;
    if url.port().is_none() {
        url.set_port(Some(DEFAULT_PORT)).ok()?;
    }
    Some(Address(url.origin().ascii_serialization()))
}

/// Derive the deduplication key of an address.
///
/// Falls back to the raw string when it does not parse; normalized input
/// always parses.
pub fn canonical_key(address: &str) -> CanonicalKey {
    let Ok(url) = Url::parse(address) else {
        return CanonicalKey(address.to_string());
    };
    let port = url.port().unwrap_or(DEFAULT_PORT);
    let host = match url.host() {
        Some(host) if is_loopback(&host) => "local".to_string(),
        Some(_) => url.host_str().unwrap_or_default().to_lowercase(),
        None => return CanonicalKey(address.to_string()),
    };
    CanonicalKey(format!("{host}:{port}"))
}

fn has_http_scheme(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

// Only the three spellings a browser would hand us count as loopback.
fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(d) => d.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => ip.octets() == [127, 0, 0, 1],
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}
