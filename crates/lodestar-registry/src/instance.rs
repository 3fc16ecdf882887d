//! Service instance URLs and registry node paths.

use std::collections::BTreeMap;

use lodestar_remoting::RawChange;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::{RegistryError, Result, DEFAULT_ROOT, PROVIDERS_NODE};

/// Characters escaped when a URL becomes a single path segment.
/// Leaves alphanumerics and `-_.~` as is.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters escaped inside query keys and values.
const QUERY_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'=')
    .add(b'?')
    .add(b'/');

/// One provider endpoint of a service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// URL scheme, e.g. `tri`.
    pub protocol: String,
    /// Advertised host. Empty means "resolve the local address".
    pub host: String,
    /// Advertised port.
    pub port: u16,
    /// Fully-qualified service name.
    pub service: String,
    /// Extra URL parameters, rendered sorted by key.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ServiceInstance {
    /// Create an instance with no parameters.
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        service: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            service: service.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a URL parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Check the fields needed to build a URL.
    pub fn validate(&self) -> Result<()> {
        if self.protocol.is_empty() {
            return Err(RegistryError::InvalidInstance("protocol is empty".to_string()));
        }
        if self.service.is_empty() {
            return Err(RegistryError::InvalidInstance("service is empty".to_string()));
        }
        if self.service.contains('/') {
            return Err(RegistryError::InvalidInstance(format!(
                "service {:?} must not contain '/'",
                self.service
            )));
        }
        if self.port == 0 {
            return Err(RegistryError::InvalidInstance("port is zero".to_string()));
        }
        Ok(())
    }

    /// `<protocol>://<host>:<port>/<service>?k=v&...`
    pub fn url(&self) -> String {
        let base = format!(
            "{}://{}:{}/{}",
            self.protocol, self.host, self.port, self.service
        );
        if self.params.is_empty() {
            return base;
        }
        let query = self
            .params
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(key, QUERY_COMPONENT),
                    utf8_percent_encode(value, QUERY_COMPONENT)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{base}?{query}")
    }
}

/// Builds registry node paths under a root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryPaths {
    root: String,
}

impl Default for RegistryPaths {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl RegistryPaths {
    /// Paths under `root`. A trailing separator is dropped; an empty root means `/`.
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self { root }
    }

    /// The root node; `/` when configured empty.
    pub fn root(&self) -> &str {
        if self.root.is_empty() {
            "/"
        } else {
            &self.root
        }
    }

    /// `<root>/<service>/providers`
    pub fn providers_path(&self, service: &str) -> String {
        format!("{}/{}/{}", self.root, service, PROVIDERS_NODE)
    }

    /// Node name of an instance: its percent-encoded URL.
    pub fn instance_node(&self, instance: &ServiceInstance) -> String {
        utf8_percent_encode(&instance.url(), SEGMENT).to_string()
    }

    /// `<root>/<service>/providers/<encoded url>`
    pub fn instance_path(&self, instance: &ServiceInstance) -> String {
        format!(
            "{}/{}",
            self.providers_path(&instance.service),
            self.instance_node(instance)
        )
    }

    /// Full provider listing of `service` as a backend would report it.
    pub fn providers_listing(&self, service: &str, instances: &[ServiceInstance]) -> RawChange {
        RawChange::ChildrenChanged {
            path: self.providers_path(service),
            children: instances
                .iter()
                .map(|instance| (self.instance_node(instance), instance.url()))
                .collect(),
        }
    }
}

/// Recover the instance URL from the last segment of an instance path.
pub fn decode_instance_url(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next().filter(|s| !s.is_empty())?;
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}
