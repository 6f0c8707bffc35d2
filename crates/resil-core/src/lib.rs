//! # resil-core
//!
//! Core types, configuration, and error handling for resilmesh - a
//! predictive failover controller for tiered forwarding fabrics.
//!
//! This crate provides the foundational data structures shared across all
//! other resilmesh components:
//!
//! - Node, link, and topology descriptor types with tier ordering
//! - Event batch ingress payloads and validation
//! - Incident records with tagged detail variants
//! - Controller configuration schema with builder and validation
//! - Unified error type and result alias

pub mod batch;
pub mod config;
pub mod error;
pub mod incident;
pub mod types;

// Re-export commonly used types at the crate root
pub use batch::{Event, EventBatch, EventMetrics, IngressReply};
pub use config::{ControllerConfig, ControllerConfigBuilder, Thresholds};
pub use error::{Error, Result};
pub use incident::{Incident, IncidentKind, Severity, TriggerReason};
pub use types::{
    FailoverMode, Link, LinkSpec, Node, NodeSpec, PathStatus, PrimarySite, RoutingMode, Tier,
    TopologySpec,
};
