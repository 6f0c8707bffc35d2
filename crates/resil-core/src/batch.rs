//! Ingress event batches and responses

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Rough serialized footprint of one event, used for transmission-delay
/// estimates in physical routing.
pub const APPROX_EVENT_BYTES: usize = 160;

/// Sensor readings carried by a single event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetrics {
    pub temperature: f64,
    pub pressure: f64,
    pub vibration: f64,
    pub motor_current: f64,
}

impl EventMetrics {
    fn all_finite(&self) -> bool {
        self.temperature.is_finite()
            && self.pressure.is_finite()
            && self.vibration.is_finite()
            && self.motor_current.is_finite()
    }
}

/// A single time-stamped event arriving at the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub device_id: String,

    /// Event timestamp, milliseconds since epoch
    pub ts: u64,

    pub metrics: EventMetrics,

    /// End-to-end delivery deadline in milliseconds
    pub deadline_ms: u64,
}

/// An ordered batch of events, the unit of ingress and forwarding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventBatch(pub Vec<Event>);

impl EventBatch {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Estimated wire size of the batch in bytes
    pub fn approx_wire_bytes(&self) -> usize {
        self.0.len() * APPROX_EVENT_BYTES
    }

    /// Tightest deadline across the batch, if any event carries one
    pub fn min_deadline_ms(&self) -> Option<u64> {
        self.0.iter().map(|e| e.deadline_ms).min()
    }

    /// Validate the batch shape; malformed batches are rejected at ingress
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::invalid_payload("batch contains no events"));
        }
        for (i, event) in self.0.iter().enumerate() {
            if event.id.trim().is_empty() {
                return Err(Error::invalid_payload(format!("event {} has empty id", i)));
            }
            if event.device_id.trim().is_empty() {
                return Err(Error::invalid_payload(format!(
                    "event {} has empty deviceId",
                    i
                )));
            }
            if event.deadline_ms == 0 {
                return Err(Error::invalid_payload(format!(
                    "event {} has zero deadline",
                    event.id
                )));
            }
            if !event.metrics.all_finite() {
                return Err(Error::invalid_payload(format!(
                    "event {} has non-finite metrics",
                    event.id
                )));
            }
        }
        Ok(())
    }
}

/// Gateway response for an ingested batch.
///
/// A batch that loses every event still gets a success reply with
/// `accepted = 0` and a reason; total loss is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressReply {
    pub accepted: usize,
    pub dropped: usize,
    pub end_to_end_latency_ms: f64,
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_id: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IngressReply {
    /// Reply for a batch delivered (possibly partially) over `path`
    pub fn delivered(
        accepted: usize,
        dropped: usize,
        latency_ms: f64,
        path: impl Into<String>,
        path_id: Option<u32>,
    ) -> Self {
        Self {
            accepted,
            dropped,
            end_to_end_latency_ms: latency_ms,
            path: path.into(),
            path_id,
            reason: None,
        }
    }

    /// Reply for a batch that lost every event in transit
    pub fn all_lost(dropped: usize, latency_ms: f64, path: impl Into<String>) -> Self {
        Self {
            accepted: 0,
            dropped,
            end_to_end_latency_ms: latency_ms,
            path: path.into(),
            path_id: None,
            reason: Some("all lost".to_string()),
        }
    }
}
