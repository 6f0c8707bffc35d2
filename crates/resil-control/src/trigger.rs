//! Predictive failover trigger
//!
//! Two independent conditions, combined with OR:
//!
//! - latency drift: aggregate EWMA and slope both over threshold,
//!   continuously for the hold window (debounced)
//! - resource pressure: any node over its CPU or buffer ceiling
//!   (fires immediately)

use resil_core::{Thresholds, TriggerReason};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Latest health reading for a node
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct NodeHealth {
    /// CPU utilisation in [0, 1]
    pub cpu: f64,
    /// Buffer fill in [0, 1]
    pub buffer_pct: f64,
}

/// Outcome of one trigger evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Neither predicate holds
    Idle,
    /// Drift predicate holds but the hold window has not yet elapsed
    Arming { since: Instant },
    /// Failover should run
    Fired { reason: TriggerReason },
}

/// Evaluates trigger conditions against aggregate telemetry
#[derive(Debug)]
pub struct TriggerEvaluator {
    thresholds: Thresholds,
    hold: Duration,
    /// When the drift predicate first became (and stayed) true
    trigger_start: Option<Instant>,
}

impl TriggerEvaluator {
    pub fn new(thresholds: Thresholds) -> Self {
        let hold = Duration::from_secs_f64(thresholds.hold_secs.max(0.0));
        Self {
            thresholds,
            hold,
            trigger_start: None,
        }
    }

    /// Start of the current debounce window, if the drift predicate holds
    pub fn trigger_start(&self) -> Option<Instant> {
        self.trigger_start
    }

    /// Clear the debounce; called after a failover restarts observation
    pub fn reset(&mut self) {
        self.trigger_start = None;
    }

    /// Evaluate both trigger conditions.
    ///
    /// Resource pressure wins immediately. The drift predicate must hold
    /// continuously for the hold window; any false evaluation resets it.
    pub fn evaluate(
        &mut self,
        ewma: Option<f64>,
        slope: f64,
        node_health: &HashMap<u32, NodeHealth>,
        now: Instant,
    ) -> TriggerDecision {
        if let Some((&node_id, health)) = node_health.iter().find(|(_, h)| {
            h.cpu > self.thresholds.cpu_max || h.buffer_pct > self.thresholds.buffer_max_pct
        }) {
            warn!(
                node_id,
                cpu = health.cpu,
                buffer_pct = health.buffer_pct,
                "resource pressure trigger"
            );
            self.trigger_start = None;
            return TriggerDecision::Fired {
                reason: TriggerReason::ResourcePressure,
            };
        }

        let drifting = ewma
            .map(|e| e > self.thresholds.ewma_max_ms && slope > self.thresholds.slope_min_ms_per_s)
            .unwrap_or(false);

        if !drifting {
            self.trigger_start = None;
            return TriggerDecision::Idle;
        }

        let since = *self.trigger_start.get_or_insert(now);
        if now.duration_since(since) >= self.hold {
            warn!(ewma = ewma.unwrap_or(0.0), slope, "latency drift trigger");
            self.trigger_start = None;
            TriggerDecision::Fired {
                reason: TriggerReason::LatencyDrift,
            }
        } else {
            debug!(
                held_ms = now.duration_since(since).as_millis() as u64,
                "latency drift arming"
            );
            TriggerDecision::Arming { since }
        }
    }
}
