//! Self-registration events for the local process.

use std::sync::Arc;

use lodestar_net::LocalAddressResolver;
use lodestar_remoting::Event;
use tracing::info;

use crate::instance::{RegistryPaths, ServiceInstance};
use crate::Result;

/// A resolved registration of one local instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Instance with its host filled in.
    pub instance: ServiceInstance,
    /// Registry node path of the instance.
    pub path: String,
    /// The `Add` event announcing the instance.
    pub event: Event,
}

impl Registration {
    /// The `Delete` event withdrawing this instance.
    pub fn deregistration_event(&self) -> Result<Event> {
        Ok(Event::deleted(self.path.as_str())?)
    }
}

/// Builds registration events, resolving the local host when needed.
#[derive(Clone)]
pub struct Registrar {
    paths: RegistryPaths,
    resolver: Arc<dyn LocalAddressResolver>,
}

impl Registrar {
    /// Create a registrar writing under `paths`.
    pub fn new(paths: RegistryPaths, resolver: Arc<dyn LocalAddressResolver>) -> Self {
        Self { paths, resolver }
    }

    /// Path layout in use.
    pub fn paths(&self) -> &RegistryPaths {
        &self.paths
    }

    /// Resolve `instance` and build its `Add` event.
    ///
    /// An empty host is replaced by the resolved local address; resolution
    /// failures are returned to the caller.
    pub fn register(&self, mut instance: ServiceInstance) -> Result<Registration> {
        instance.validate()?;
        if instance.host.is_empty() {
            instance.host = self.resolver.resolve_local_address()?;
        }

        let path = self.paths.instance_path(&instance);
        let event = Event::added(path.as_str(), instance.url())?;
        info!(
            service = %instance.service,
            host = %instance.host,
            port = instance.port,
            "self-registration prepared"
        );
        Ok(Registration {
            instance,
            path,
            event,
        })
    }
}
