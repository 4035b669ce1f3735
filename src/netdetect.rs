//! Local IPv4 networks and /24 sweep targets.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;

use crate::address::Address;
use crate::config::DEFAULT_PORT;
use crate::error::DiscoveryError;

/// Number of hosts probed by a subnet sweep: `.1` through `.255`.
pub const SWEEP_SIZE: usize = 255;

/// The first three octets of an IPv4 /24, e.g. `192.168.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubnetPrefix([u8; 3]);

impl SubnetPrefix {
    pub fn octets(&self) -> [u8; 3] {
        self.0
    }

    /// The /24 network this prefix names.
    pub fn network(&self) -> Ipv4Net {
        ipv4_to_default_cidr(self.host(0))
    }

    pub fn host(&self, last: u8) -> Ipv4Addr {
        let [a, b, c] = self.0;
        Ipv4Addr::new(a, b, c, last)
    }

    /// Sweep targets `http://{prefix}.{i}:3000` for `i` in `1..=255`, in order.
    pub fn sweep_targets(&self) -> Vec<Address> {
        (1..=u8::MAX)
            .map(|i| Address::from_raw(format!("http://{}:{}", self.host(i), DEFAULT_PORT)))
            .collect()
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

impl FromStr for SubnetPrefix {
    type Err = DiscoveryError;

    /// Exactly three dot-separated decimal octets, each in `0..=255`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || DiscoveryError::InvalidPrefix(s.to_string());
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let mut octets = [0u8; 3];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self(octets))
    }
}

/// Detect local non-loopback IPv4 addresses, in interface order, without duplicates.
pub fn detect_local_ipv4s() -> Result<Vec<Ipv4Addr>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            let ip = v4.ip;
            if ip.is_loopback() || !seen.insert(ip) {
                continue;
            }
            out.push(ip);
        }
    }
    Ok(out)
}

/// Detect the /24 prefixes of all local non-loopback IPv4 interfaces, sorted.
pub fn detect_local_prefixes() -> Result<Vec<SubnetPrefix>> {
    let mut set = HashSet::new();
    for ip in detect_local_ipv4s()? {
        set.insert(prefix_of(ip));
    }
    let mut prefixes: Vec<SubnetPrefix> = set.into_iter().collect();
    // Sort for stable output
    prefixes.sort_by_key(|p| p.octets());
    Ok(prefixes)
}

/// The /24 prefix an address belongs to.
pub fn prefix_of(ip: Ipv4Addr) -> SubnetPrefix {
    let o = ip.octets();
    SubnetPrefix([o[0], o[1], o[2]])
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    Ipv4Net::new(net, 24).expect("/24 is always valid")
}
