//! Core type definitions for resilmesh

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tier a node belongs to in the forwarding fabric.
///
/// Tiers are ordered: a valid forwarding path traverses tiers in
/// non-decreasing order from edge to cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Edge,
    Core,
    Cloud,
}

impl Tier {
    /// Get the ordinal index of this tier (edge < core < cloud)
    pub fn index(&self) -> u8 {
        match self {
            Tier::Edge => 0,
            Tier::Core => 1,
            Tier::Cloud => 2,
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "edge" => Ok(Tier::Edge),
            "core" => Ok(Tier::Core),
            "cloud" => Ok(Tier::Cloud),
            _ => Err(format!("Unknown tier: {}", s)),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Edge => write!(f, "edge"),
            Tier::Core => write!(f, "core"),
            Tier::Cloud => write!(f, "cloud"),
        }
    }
}

/// Health status of a registered forwarding path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    /// Carrying its assigned share of traffic
    Healthy,
    /// Latency drift or pressure detected; load shed to residual
    Degraded,
    /// Metrics back under thresholds; waiting out the stability window
    Recovering,
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStatus::Healthy => write!(f, "healthy"),
            PathStatus::Degraded => write!(f, "degraded"),
            PathStatus::Recovering => write!(f, "recovering"),
        }
    }
}

/// How the gateway reacts when the failover trigger fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverMode {
    /// Swap only after hard failure
    Reactive,
    /// Standby path kept ready, swap is immediate
    Warm,
    /// Standby must spin up before taking traffic
    Cold,
    /// Redistribute ahead of failure from drift prediction
    Predictive,
}

impl std::str::FromStr for FailoverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reactive" => Ok(FailoverMode::Reactive),
            "warm" => Ok(FailoverMode::Warm),
            "cold" => Ok(FailoverMode::Cold),
            "predictive" => Ok(FailoverMode::Predictive),
            _ => Err(format!("Unknown failover mode: {}", s)),
        }
    }
}

impl fmt::Display for FailoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailoverMode::Reactive => write!(f, "reactive"),
            FailoverMode::Warm => write!(f, "warm"),
            FailoverMode::Cold => write!(f, "cold"),
            FailoverMode::Predictive => write!(f, "predictive"),
        }
    }
}

/// Whether batches traverse the physical three-node pipeline or the
/// virtual overlay topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    Physical,
    Virtual,
}

impl std::str::FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "physical" => Ok(RoutingMode::Physical),
            "virtual" => Ok(RoutingMode::Virtual),
            _ => Err(format!("Unknown routing mode: {}", s)),
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::Physical => write!(f, "physical"),
            RoutingMode::Virtual => write!(f, "virtual"),
        }
    }
}

/// Which site is preferred as the primary sink for forwarded batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimarySite {
    Edge,
    Cloud,
}

impl std::str::FromStr for PrimarySite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "edge" => Ok(PrimarySite::Edge),
            "cloud" => Ok(PrimarySite::Cloud),
            _ => Err(format!("Unknown primary site: {}", s)),
        }
    }
}

impl fmt::Display for PrimarySite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimarySite::Edge => write!(f, "edge"),
            PrimarySite::Cloud => write!(f, "cloud"),
        }
    }
}

/// Topology descriptor as read from disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySpec {
    pub nodes: Vec<NodeSpec>,
    pub links: Vec<LinkSpec>,
}

/// A node entry in the topology descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node identifier; any integer id is accepted
    pub id: u32,

    /// Tier this node serves in
    pub tier: Tier,

    /// Quality tag (free-form, e.g. "high", "best-effort")
    #[serde(default)]
    pub quality: String,

    /// Name of the coarse-grained external tier this node maps onto
    #[serde(default)]
    pub physical_map: String,

    /// Processing capacity hint in events per second
    #[serde(default)]
    pub cpu_ev_sec: f64,

    /// Buffer capacity hint in events
    #[serde(default)]
    pub buffer_size: u32,
}

/// A link entry in the topology descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    /// One endpoint node id
    pub u: u32,

    /// Other endpoint node id
    pub v: u32,

    /// Bandwidth in Mbps
    pub bw_mbps: f64,

    /// Propagation delay in milliseconds
    pub delay_ms: f64,

    /// Jitter amplitude in milliseconds
    #[serde(default)]
    pub jitter_ms: f64,

    /// Packet loss rate in [0, 1]
    #[serde(default)]
    pub loss_rate: f64,
}

/// Runtime state of a topology node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: u32,
    pub tier: Tier,
    pub quality: String,
    pub physical_map: String,
    pub cpu_ev_sec: f64,
    pub buffer_size: u32,

    /// Current utilisation in [0, 1]; mutated by telemetry
    pub utilization: f64,
}

impl Node {
    /// Build the runtime record from a descriptor entry
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            id: spec.id,
            tier: spec.tier,
            quality: spec.quality.clone(),
            physical_map: spec.physical_map.clone(),
            cpu_ev_sec: spec.cpu_ev_sec,
            buffer_size: spec.buffer_size,
            utilization: 0.0,
        }
    }
}

/// Runtime state of an undirected topology link.
///
/// Invariant: `delay_ms >= base_delay_ms`. Removing a fault restores
/// `delay_ms` to the snapshot taken at injection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub u: u32,
    pub v: u32,
    pub bandwidth_mbps: f64,
    pub base_delay_ms: f64,
    pub delay_ms: f64,
    pub jitter_ms: f64,
    pub loss_rate: f64,

    /// Current utilisation in [0, 1]; mutated by telemetry
    pub utilization: f64,

    /// Delay snapshot taken when the first fault touched this link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_delay_ms: Option<f64>,
}

impl Link {
    /// Build the runtime record from a descriptor entry
    pub fn from_spec(spec: &LinkSpec) -> Self {
        Self {
            u: spec.u,
            v: spec.v,
            bandwidth_mbps: spec.bw_mbps,
            base_delay_ms: spec.delay_ms,
            delay_ms: spec.delay_ms,
            jitter_ms: spec.jitter_ms,
            loss_rate: spec.loss_rate,
            utilization: 0.0,
            snapshot_delay_ms: None,
        }
    }

    /// Get the endpoint opposite to `node_id`, if this link touches it
    pub fn other_endpoint(&self, node_id: u32) -> Option<u32> {
        if self.u == node_id {
            Some(self.v)
        } else if self.v == node_id {
            Some(self.u)
        } else {
            None
        }
    }

    /// Check whether this link is incident to `node_id`
    pub fn touches(&self, node_id: u32) -> bool {
        self.u == node_id || self.v == node_id
    }

    /// Effective remaining capacity in Mbps
    pub fn available_bandwidth(&self) -> f64 {
        self.bandwidth_mbps * (1.0 - self.utilization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Edge < Tier::Core);
        assert!(Tier::Core < Tier::Cloud);
        assert_eq!(Tier::Edge.index(), 0);
        assert_eq!(Tier::Cloud.index(), 2);
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("edge".parse::<Tier>().unwrap(), Tier::Edge);
        assert_eq!("Cloud".parse::<Tier>().unwrap(), Tier::Cloud);
        assert!("fog".parse::<Tier>().is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("cold".parse::<FailoverMode>().unwrap(), FailoverMode::Cold);
        assert_eq!(
            "predictive".parse::<FailoverMode>().unwrap(),
            FailoverMode::Predictive
        );
        assert!("lukewarm".parse::<FailoverMode>().is_err());

        assert_eq!(
            "virtual".parse::<RoutingMode>().unwrap(),
            RoutingMode::Virtual
        );
        assert_eq!("edge".parse::<PrimarySite>().unwrap(), PrimarySite::Edge);
    }

    #[test]
    fn test_link_endpoints() {
        let link = Link::from_spec(&LinkSpec {
            u: 1,
            v: 9,
            bw_mbps: 100.0,
            delay_ms: 5.0,
            jitter_ms: 1.0,
            loss_rate: 0.001,
        });

        assert_eq!(link.other_endpoint(1), Some(9));
        assert_eq!(link.other_endpoint(9), Some(1));
        assert_eq!(link.other_endpoint(4), None);
        assert!(link.touches(1));
        assert!(!link.touches(4));
        assert_eq!(link.base_delay_ms, link.delay_ms);
    }

    #[test]
    fn test_link_available_bandwidth() {
        let mut link = Link::from_spec(&LinkSpec {
            u: 1,
            v: 2,
            bw_mbps: 100.0,
            delay_ms: 5.0,
            jitter_ms: 0.0,
            loss_rate: 0.0,
        });

        assert_eq!(link.available_bandwidth(), 100.0);
        link.utilization = 0.25;
        assert_eq!(link.available_bandwidth(), 75.0);
    }

    #[test]
    fn test_descriptor_parsing() {
        let raw = r#"{
            "nodes": [
                { "id": 1, "tier": "edge", "quality": "high", "physical_map": "n1", "cpu_ev_sec": 100.0 },
                { "id": 9, "tier": "core" },
                { "id": 19, "tier": "cloud" }
            ],
            "links": [
                { "u": 1, "v": 9, "bw_mbps": 100.0, "delay_ms": 5.0, "jitter_ms": 1.0, "loss_rate": 0.001 },
                { "u": 9, "v": 19, "bw_mbps": 1000.0, "delay_ms": 12.0 }
            ]
        }"#;

        let spec: TopologySpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.nodes.len(), 3);
        assert_eq!(spec.links.len(), 2);
        assert_eq!(spec.nodes[0].tier, Tier::Edge);
        assert_eq!(spec.nodes[1].quality, "");
        assert_eq!(spec.links[1].jitter_ms, 0.0);
    }
}
