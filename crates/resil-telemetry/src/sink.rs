//! Telemetry sinks
//!
//! The controller reports raw latency records and incident records
//! through a sink trait so tests can substitute their own capture.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use resil_core::{Incident, IncidentKind, Severity};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// One raw latency observation as reported by the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyRecord {
    pub at: DateTime<Utc>,
    /// Path the batch took, when routed over the overlay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_id: Option<u32>,
    pub latency_ms: f64,
    pub batch_len: usize,
}

/// Destination for telemetry emitted by the controller
pub trait TelemetrySink: Send + Sync {
    /// Record one batch latency observation
    fn record_latency(&self, record: LatencyRecord);

    /// Record an incident; returns the assigned incident id
    fn record_incident(&self, severity: Severity, kind: IncidentKind) -> u64;

    /// Recent latency records, oldest first
    fn latency_records(&self) -> Vec<LatencyRecord>;

    /// Recent incidents, oldest first
    fn incidents(&self) -> Vec<Incident>;
}

/// Bounded in-memory sink backing the read endpoints.
///
/// Both buffers drop their oldest entry on overflow; nothing is
/// persisted.
pub struct InMemorySink {
    records: Mutex<VecDeque<LatencyRecord>>,
    incidents: Mutex<VecDeque<Incident>>,
    next_incident_id: AtomicU64,
    record_capacity: usize,
    incident_capacity: usize,
}

impl InMemorySink {
    /// Default bound on retained latency records
    pub const DEFAULT_RECORD_CAPACITY: usize = 1000;

    /// Default bound on retained incidents
    pub const DEFAULT_INCIDENT_CAPACITY: usize = 200;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_RECORD_CAPACITY, Self::DEFAULT_INCIDENT_CAPACITY)
    }

    pub fn with_capacity(record_capacity: usize, incident_capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(record_capacity)),
            incidents: Mutex::new(VecDeque::with_capacity(incident_capacity)),
            next_incident_id: AtomicU64::new(1),
            record_capacity,
            incident_capacity,
        }
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for InMemorySink {
    fn record_latency(&self, record: LatencyRecord) {
        let mut records = self.records.lock();
        if records.len() == self.record_capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    fn record_incident(&self, severity: Severity, kind: IncidentKind) -> u64 {
        let id = self.next_incident_id.fetch_add(1, Ordering::Relaxed);
        info!(
            incident_id = id,
            kind = kind.label(),
            severity = ?severity,
            "incident recorded"
        );
        let mut incidents = self.incidents.lock();
        if incidents.len() == self.incident_capacity {
            incidents.pop_front();
        }
        incidents.push_back(Incident::new(id, severity, kind));
        id
    }

    fn latency_records(&self) -> Vec<LatencyRecord> {
        self.records.lock().iter().cloned().collect()
    }

    fn incidents(&self) -> Vec<Incident> {
        self.incidents.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(latency_ms: f64) -> LatencyRecord {
        LatencyRecord {
            at: Utc::now(),
            path_id: Some(0),
            latency_ms,
            batch_len: 10,
        }
    }

    #[test]
    fn test_latency_records_bounded() {
        let sink = InMemorySink::with_capacity(3, 3);
        for i in 0..5 {
            sink.record_latency(record(i as f64));
        }
        let records = sink.latency_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].latency_ms, 2.0);
        assert_eq!(records[2].latency_ms, 4.0);
    }

    #[test]
    fn test_incident_ids_are_monotonic() {
        let sink = InMemorySink::new();
        let a = sink.record_incident(Severity::Medium, IncidentKind::NodeDown { node_id: 9 });
        let b = sink.record_incident(Severity::High, IncidentKind::NodeRecover { node_id: 9 });
        assert!(b > a);

        let incidents = sink.incidents();
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0].id, a);
        assert_eq!(incidents[1].id, b);
    }

    #[test]
    fn test_incident_buffer_bounded() {
        let sink = InMemorySink::with_capacity(10, 2);
        for i in 0..4 {
            sink.record_incident(Severity::Medium, IncidentKind::NodeDown { node_id: i });
        }
        let incidents = sink.incidents();
        assert_eq!(incidents.len(), 2);
        assert!(matches!(
            incidents[0].kind,
            IncidentKind::NodeDown { node_id: 2 }
        ));
    }
}
