//! Incident records emitted by the controller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a failover trigger fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Sustained EWMA and slope violation over the hold window
    LatencyDrift,
    /// A node reported CPU or buffer pressure over threshold
    ResourcePressure,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::LatencyDrift => write!(f, "latency_drift"),
            TriggerReason::ResourcePressure => write!(f, "resource_pressure"),
        }
    }
}

/// Incident severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

/// What happened, with the details that kind carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncidentKind {
    /// A batch missed its delivery deadline
    DeadlineMiss {
        batch_id: String,
        deadline_ms: u64,
        observed_ms: f64,
    },
    /// Traffic was redistributed away from degraded paths
    Failover {
        reason: TriggerReason,
        degraded_paths: Vec<u32>,
        bottleneck_nodes: Vec<u32>,
        ewma_ms: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        spin_up_delay_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mttr_ms: Option<u64>,
    },
    /// A node stopped answering health polls
    NodeDown { node_id: u32 },
    /// A previously down node answered again
    NodeRecover { node_id: u32 },
}

impl IncidentKind {
    /// Short label for logging and counters
    pub fn label(&self) -> &'static str {
        match self {
            IncidentKind::DeadlineMiss { .. } => "deadline_miss",
            IncidentKind::Failover { .. } => "failover",
            IncidentKind::NodeDown { .. } => "node_down",
            IncidentKind::NodeRecover { .. } => "node_recover",
        }
    }
}

/// A single incident record kept in the in-memory incident buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Monotonically increasing id
    pub id: u64,
    pub severity: Severity,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: IncidentKind,
}

impl Incident {
    pub fn new(id: u64, severity: Severity, kind: IncidentKind) -> Self {
        Self {
            id,
            severity,
            at: Utc::now(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_labels() {
        let kind = IncidentKind::NodeDown { node_id: 9 };
        assert_eq!(kind.label(), "node_down");

        let kind = IncidentKind::Failover {
            reason: TriggerReason::LatencyDrift,
            degraded_paths: vec![0],
            bottleneck_nodes: vec![],
            ewma_ms: 130.0,
            spin_up_delay_ms: None,
            mttr_ms: None,
        };
        assert_eq!(kind.label(), "failover");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_incident_serialization_is_tagged() {
        let incident = Incident::new(
            3,
            Severity::High,
            IncidentKind::Failover {
                reason: TriggerReason::ResourcePressure,
                degraded_paths: vec![1, 2],
                bottleneck_nodes: vec![9],
                ewma_ms: 180.0,
                spin_up_delay_ms: Some(512),
                mttr_ms: Some(640),
            },
        );

        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["kind"], "failover");
        assert_eq!(json["reason"], "resource_pressure");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["spin_up_delay_ms"], 512);
    }

    #[test]
    fn test_trigger_reason_display() {
        assert_eq!(TriggerReason::LatencyDrift.to_string(), "latency_drift");
        assert_eq!(
            TriggerReason::ResourcePressure.to_string(),
            "resource_pressure"
        );
    }
}
