//! # lodestar-registry
//!
//! Registry-facing glue around the notification core:
//!
//! - [`instance`] - service instance URLs and registry node paths
//! - [`registrar`] - self-registration and deregistration events
//! - [`directory`] - a listener keeping the live provider table
//! - [`bridge`] - task feeding raw watch notifications into a dispatcher
//!
//! ## Path layout
//!
//! | Node | Path |
//! |---|---|
//! | service providers | `<root>/<service>/providers` |
//! | one instance | `<root>/<service>/providers/<percent-encoded URL>` |

pub mod bridge;
pub mod directory;
pub mod instance;
pub mod registrar;

pub use bridge::{BridgeStats, ChangeSink, WatchBridge};
pub use directory::ServiceDirectory;
pub use instance::{decode_instance_url, RegistryPaths, ServiceInstance};
pub use registrar::{Registrar, Registration};

/// Default registry root node.
pub const DEFAULT_ROOT: &str = "/lodestar";

/// Leaf under a service node holding provider instances.
pub const PROVIDERS_NODE: &str = "providers";

/// Error types for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A service instance is missing required fields.
    #[error("invalid service instance: {0}")]
    InvalidInstance(String),

    /// Error from the notification core.
    #[error("remoting error: {0}")]
    Remoting(#[from] lodestar_remoting::RemotingError),

    /// Local address discovery failed.
    #[error("address error: {0}")]
    Net(#[from] lodestar_net::NetError),

    /// The watch bridge has stopped accepting changes.
    #[error("watch bridge closed")]
    BridgeClosed,
}

/// Convenience result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
