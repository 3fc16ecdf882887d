//! # lodestar-net
//!
//! Local address discovery for service self-registration.
//!
//! - [`interface`] - interface snapshots and the system enumerator
//! - [`resolve`] - private-range preference policy and the resolver seam
//!
//! ## Selection policy
//!
//! | Step | Rule |
//! |---|---|
//! | 1 | skip interfaces that are down or loopback |
//! | 2 | skip interfaces whose name contains an excluded marker (default `docker`) |
//! | 3 | per interface, first non-loopback IPv4 address |
//! | 3a | IPv4-mapped IPv6 addresses count as IPv4 |
//! | 4 | a candidate in 10/8, 172.16/12 or 192.168/16 wins, the last one by default |
//! | 5 | otherwise any candidate, the last one by default; none at all is [`NetError::NoLocalAddress`] |

pub mod interface;
pub mod resolve;

pub use interface::{InterfaceInfo, InterfaceSource, SystemInterfaces};
pub use resolve::{
    is_private_ipv4, resolve_local_address, select_local_ipv4, AddressPolicy, CandidateOrder,
    LocalAddressResolver, SystemResolver,
};

/// Error types for local address discovery.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// No interface carried a usable IPv4 address.
    #[error("no local address found")]
    NoLocalAddress,

    /// Enumerating interfaces failed.
    #[error("interface enumeration failed: {0}")]
    Interfaces(#[from] std::io::Error),
}

/// Convenience result type for address discovery.
pub type Result<T> = std::result::Result<T, NetError>;
