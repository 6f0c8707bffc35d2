//! # resil-gateway
//!
//! Ingress dispatching, the HTTP surface, and background workers for
//! resilmesh.
//!
//! Batches arrive over HTTP, the dispatcher routes them across the
//! overlay (virtual mode) or the active physical route (physical mode),
//! observed latency feeds the controller, and two background workers run
//! alongside the handlers: a node-health poller and the gradual-revert
//! stepper. All controller access goes through one `RwLock`; no lock is
//! held across a downstream call or a simulated transit sleep.

pub mod config;
pub mod dispatch;
pub mod forward;
pub mod gateway;
pub mod server;
pub mod stats;
pub mod workers;

pub use config::{GatewayConfig, GatewayConfigBuilder, SeedPath};
pub use dispatch::Dispatcher;
pub use forward::{Forwarder, HttpForwarder};
pub use gateway::Gateway;
pub use stats::GatewayStats;

pub use resil_core::{Error, Result};
