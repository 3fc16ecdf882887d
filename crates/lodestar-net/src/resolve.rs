//! Choosing the address a process advertises in its registration.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::interface::{InterfaceInfo, InterfaceSource, SystemInterfaces};
use crate::{NetError, Result};

/// Private IPv4 blocks as `(network, prefix length)`.
const PRIVATE_BLOCKS: [(Ipv4Addr, u8); 3] = [
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
];

/// Whether `addr` falls in 10.0.0.0/8, 172.16.0.0/12 or 192.168.0.0/16.
pub fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    let bits = u32::from(addr);
    PRIVATE_BLOCKS.iter().any(|(network, prefix)| {
        let mask = u32::MAX << (32 - u32::from(*prefix));
        bits & mask == u32::from(*network)
    })
}

/// Which candidate wins when several interfaces qualify.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrder {
    /// The earliest interface in enumeration order.
    First,
    /// The latest interface in enumeration order.
    #[default]
    Last,
}

/// Tunables for address selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPolicy {
    /// Case-insensitive name fragments marking virtual interfaces to skip.
    #[serde(default = "default_excluded")]
    pub excluded_interfaces: Vec<String>,
    /// Tie-break between qualifying interfaces, in both the private and fallback tiers.
    #[serde(default)]
    pub candidate_order: CandidateOrder,
}

fn default_excluded() -> Vec<String> {
    vec!["docker".to_string()]
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self {
            excluded_interfaces: default_excluded(),
            candidate_order: CandidateOrder::default(),
        }
    }
}

impl AddressPolicy {
    fn is_excluded(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.excluded_interfaces
            .iter()
            .any(|marker| !marker.is_empty() && name.contains(&marker.to_lowercase()))
    }

    fn keep(&self, slot: &mut Option<(Ipv4Addr, String)>, addr: Ipv4Addr, iface: &str) {
        if slot.is_none() || self.candidate_order == CandidateOrder::Last {
            *slot = Some((addr, iface.to_string()));
        }
    }
}

/// Pick the IPv4 address to advertise from an interface snapshot.
pub fn select_local_ipv4(interfaces: &[InterfaceInfo], policy: &AddressPolicy) -> Result<Ipv4Addr> {
    let mut private: Option<(Ipv4Addr, String)> = None;
    let mut fallback: Option<(Ipv4Addr, String)> = None;

    for iface in interfaces {
        if !iface.up || iface.loopback || policy.is_excluded(&iface.name) {
            continue;
        }
        let Some(candidate) = first_ipv4(&iface.addrs) else {
            continue;
        };
        policy.keep(&mut fallback, candidate, &iface.name);
        if is_private_ipv4(candidate) {
            policy.keep(&mut private, candidate, &iface.name);
        }
    }

    if let Some((addr, iface)) = private {
        debug!(interface = %iface, addr = %addr, "private local address selected");
        return Ok(addr);
    }
    match fallback {
        Some((addr, iface)) => {
            debug!(interface = %iface, addr = %addr, "no private address; using public local address");
            Ok(addr)
        }
        None => Err(NetError::NoLocalAddress),
    }
}

fn first_ipv4(addrs: &[IpAddr]) -> Option<Ipv4Addr> {
    addrs.iter().find_map(|addr| {
        let v4 = match addr {
            IpAddr::V4(v4) => *v4,
            IpAddr::V6(v6) if !v6.is_loopback() => v6.to_ipv4_mapped()?,
            IpAddr::V6(_) => return None,
        };
        (!v4.is_loopback() && !v4.is_unspecified()).then_some(v4)
    })
}

/// Supplies the address embedded in self-registration events.
pub trait LocalAddressResolver: Send + Sync {
    /// Best-effort reachable local address.
    fn resolve_local_address(&self) -> Result<String>;
}

/// Resolver backed by an [`InterfaceSource`] and an [`AddressPolicy`].
#[derive(Clone, Debug, Default)]
pub struct SystemResolver<S = SystemInterfaces> {
    source: S,
    policy: AddressPolicy,
}

impl SystemResolver<SystemInterfaces> {
    /// Resolver over the host's interfaces with the given policy.
    pub fn new(policy: AddressPolicy) -> Self {
        Self::with_source(SystemInterfaces, policy)
    }
}

impl<S: InterfaceSource> SystemResolver<S> {
    /// Resolver over an arbitrary interface source.
    pub fn with_source(source: S, policy: AddressPolicy) -> Self {
        Self { source, policy }
    }
}

impl<S: InterfaceSource> LocalAddressResolver for SystemResolver<S> {
    fn resolve_local_address(&self) -> Result<String> {
        let interfaces = self.source.interfaces()?;
        select_local_ipv4(&interfaces, &self.policy).map(|addr| addr.to_string())
    }
}

/// Resolve the host's local address with the default policy.
pub fn resolve_local_address() -> Result<String> {
    SystemResolver::new(AddressPolicy::default()).resolve_local_address()
}
