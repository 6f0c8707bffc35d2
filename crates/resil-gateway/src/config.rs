//! Gateway configuration

use resil_core::{ControllerConfig, Error, Result, RoutingMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A forwarding path registered at startup with its optimal load share
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPath {
    pub id: u32,
    pub nodes: Vec<u32>,
    pub load_pct: f64,
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind address for the HTTP server
    pub bind_address: String,

    /// HTTP server listen port
    pub port: u16,

    /// Topology descriptor path
    pub topology_path: PathBuf,

    /// Physical pipeline or virtual overlay routing
    pub routing_mode: RoutingMode,

    /// Downstream base URLs keyed by the coarse tier name nodes map onto
    pub downstream_urls: BTreeMap<String, String>,

    /// Paths registered at startup; when empty the gateway derives
    /// disjoint routes from the topology instead
    #[serde(default)]
    pub seed_paths: Vec<SeedPath>,

    /// Timeout for forwarding a batch downstream
    pub ingress_timeout: Duration,

    /// Timeout for a single health poll
    pub health_timeout: Duration,

    /// How often the health poller runs
    pub health_poll_interval: Duration,

    /// Control-loop configuration
    pub controller: ControllerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            topology_path: PathBuf::from("topology.json"),
            routing_mode: RoutingMode::Virtual,
            downstream_urls: BTreeMap::new(),
            seed_paths: Vec::new(),
            ingress_timeout: Duration::from_secs(5),
            health_timeout: Duration::from_secs(2),
            health_poll_interval: Duration::from_secs(2),
            controller: ControllerConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: GatewayConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port must be greater than 0"));
        }
        if self.ingress_timeout.is_zero() {
            return Err(Error::config("ingress_timeout must be greater than 0"));
        }
        if self.health_timeout.is_zero() {
            return Err(Error::config("health_timeout must be greater than 0"));
        }
        if self.health_poll_interval.is_zero() {
            return Err(Error::config("health_poll_interval must be greater than 0"));
        }
        for seed in &self.seed_paths {
            if seed.nodes.len() < 2 {
                return Err(Error::config(format!(
                    "seed path {} needs at least two nodes",
                    seed.id
                )));
            }
            if seed.load_pct < 0.0 {
                return Err(Error::config(format!(
                    "seed path {} has negative load",
                    seed.id
                )));
            }
        }
        self.controller.validate()
    }

    /// Socket address string for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Builder for GatewayConfig
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    /// Set the bind address
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.bind_address = address.into();
        self
    }

    /// Set the HTTP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the topology descriptor path
    pub fn topology_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.topology_path = path.into();
        self
    }

    /// Set the routing mode
    pub fn routing_mode(mut self, mode: RoutingMode) -> Self {
        self.config.routing_mode = mode;
        self
    }

    /// Add a downstream URL for a coarse tier name
    pub fn downstream_url(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.config.downstream_urls.insert(name.into(), url.into());
        self
    }

    /// Add a seed path
    pub fn seed_path(mut self, id: u32, nodes: Vec<u32>, load_pct: f64) -> Self {
        self.config.seed_paths.push(SeedPath { id, nodes, load_pct });
        self
    }

    /// Set the ingress forwarding timeout
    pub fn ingress_timeout(mut self, timeout: Duration) -> Self {
        self.config.ingress_timeout = timeout;
        self
    }

    /// Set the health poll timeout
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.config.health_timeout = timeout;
        self
    }

    /// Set the health poll interval
    pub fn health_poll_interval(mut self, interval: Duration) -> Self {
        self.config.health_poll_interval = interval;
        self
    }

    /// Set the controller configuration
    pub fn controller(mut self, controller: ControllerConfig) -> Self {
        self.config.controller = controller;
        self
    }

    /// Build the configuration
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

impl Default for GatewayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
