//! # resil-control
//!
//! The control loop of resilmesh: per-path health bookkeeping, the
//! predictive failover trigger, weighted rebalancing away from degraded
//! paths, and the gradual revert back to the optimal distribution.
//!
//! The [`Controller`] owns every piece of mutable control state; callers
//! serialise access through one lock and never hold it across I/O.

pub mod controller;
pub mod rebalance;
pub mod registry;
pub mod revert;
pub mod trigger;

pub use controller::{Controller, ControllerStateView, PathView, PendingFailover};
pub use rebalance::{find_bottleneck_nodes, rebalanced_distribution};
pub use registry::{PathMetrics, PathRegistry, DEGRADED_RESIDUAL_PCT, DISTRIBUTION_EPSILON};
pub use revert::{plan_revert, RevertSchedule, RevertStep};
pub use trigger::{NodeHealth, TriggerDecision, TriggerEvaluator};

pub use resil_core::{Error, Result};
