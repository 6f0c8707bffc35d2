//! # resil-topology
//!
//! Topology store and graph engine for resilmesh.
//!
//! This crate owns the overlay graph the gateway forwards across:
//!
//! - Loading and validating the topology descriptor
//! - Bidirectional adjacency over shared link records
//! - Shortest-path and k node-disjoint path queries
//! - Path latency, capacity, and composite scoring
//! - Tier-order validation of candidate paths
//! - Latency fault injection knobs for per-node degradation

pub mod graph;
pub mod paths;

pub use graph::Topology;
pub use resil_core::{Error, Result};
