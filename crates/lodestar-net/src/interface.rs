//! Network interface snapshots.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::Result;

/// One network interface and the addresses bound to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// OS interface name, e.g. `eth0`.
    pub name: String,
    /// Administratively up.
    pub up: bool,
    /// Loopback interface.
    pub loopback: bool,
    /// Bound addresses in enumeration order.
    pub addrs: Vec<IpAddr>,
}

impl InterfaceInfo {
    /// Build an interface that is up and not loopback.
    pub fn new(name: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        Self {
            name: name.into(),
            up: true,
            loopback: false,
            addrs,
        }
    }
}

/// Source of interface snapshots.
pub trait InterfaceSource: Send + Sync {
    /// Enumerate interfaces currently present on the host.
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>>;
}

/// Enumerates the host's interfaces through `getifaddrs(3)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemInterfaces;

#[cfg(unix)]
impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        use std::net::{SocketAddrV4, SocketAddrV6};

        use nix::ifaddrs::getifaddrs;
        use nix::net::if_::InterfaceFlags;

        let mut out: Vec<InterfaceInfo> = Vec::new();
        for entry in getifaddrs().map_err(std::io::Error::from)? {
            let ip = entry.address.as_ref().and_then(|addr| {
                if let Some(sin) = addr.as_sockaddr_in() {
                    Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()))
                } else {
                    addr.as_sockaddr_in6()
                        .map(|sin6| IpAddr::V6(*SocketAddrV6::from(*sin6).ip()))
                }
            });

            // getifaddrs yields one entry per address; fold them per interface.
            let idx = match out.iter().position(|i| i.name == entry.interface_name) {
                Some(idx) => idx,
                None => {
                    out.push(InterfaceInfo {
                        name: entry.interface_name.clone(),
                        up: entry.flags.contains(InterfaceFlags::IFF_UP),
                        loopback: entry.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                        addrs: Vec::new(),
                    });
                    out.len() - 1
                }
            };
            if let Some(ip) = ip {
                out[idx].addrs.push(ip);
            }
        }
        Ok(out)
    }
}

#[cfg(not(unix))]
impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "interface enumeration is only implemented for unix targets",
        )
        .into())
    }
}
