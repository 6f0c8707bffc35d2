//! # resil-telemetry
//!
//! Latency windows, EWMA and slope statistics, and telemetry sinks for
//! resilmesh.
//!
//! The controller watches one aggregate latency window plus one window per
//! registered path; each window is a bounded ring of batch latency samples
//! from which an EWMA and a least-squares slope are derived. Incidents and
//! raw latency records flow into a [`TelemetrySink`], whose in-memory
//! implementation keeps bounded history for the read endpoints.

pub mod ring;
pub mod sink;
pub mod stats;

pub use ring::{LatencyRing, LatencySample};
pub use sink::{InMemorySink, LatencyRecord, TelemetrySink};
pub use stats::LatencyStats;

pub use resil_core::{Error, Result};
