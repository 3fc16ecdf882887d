//! Configuration file management.

use std::collections::BTreeMap;
use std::path::PathBuf;

use lodestar_net::AddressPolicy;
use lodestar_registry::{ServiceInstance, DEFAULT_ROOT};
use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// The local service this process registers.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Registry layout and watches.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Local address discovery.
    #[serde(default)]
    pub net: AddressPolicy,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

/// Local service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Fully-qualified service name. Empty = do not self-register.
    #[serde(default)]
    pub name: String,
    /// URL scheme advertised to consumers.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Advertised host. Empty = resolve the local address.
    #[serde(default)]
    pub host: String,
    /// Advertised port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Extra URL parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root node under which services live.
    #[serde(default = "default_root")]
    pub root: String,
    /// Services whose providers are mirrored locally.
    #[serde(default)]
    pub watch: Vec<String>,
    /// Raw change queue depth between watch source and dispatcher.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Read newline-delimited JSON raw changes from stdin.
    #[serde(default)]
    pub stdin_feed: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_protocol() -> String {
    "tri".to_string()
}

fn default_port() -> u16 {
    20000
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            protocol: default_protocol(),
            host: String::new(),
            port: default_port(),
            params: BTreeMap::new(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            watch: Vec::new(),
            channel_capacity: default_channel_capacity(),
            stdin_feed: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    /// The instance to register, if a service name is configured.
    pub fn instance(&self) -> Option<ServiceInstance> {
        if self.name.is_empty() {
            return None;
        }
        let mut instance =
            ServiceInstance::new(&self.protocol, &self.host, self.port, &self.name);
        instance.params = self.params.clone();
        Some(instance)
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        // Explicit file wins over the home directory.
        if let Ok(path) = std::env::var("LODESTAR_CONFIG") {
            return PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("LODESTAR_HOME") {
            return PathBuf::from(dir).join("config.toml");
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".lodestar"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/lodestar"))
            .join("config.toml")
    }
}
