//! Bounded latency sample ring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One observed batch latency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub at: DateTime<Utc>,
    pub latency_ms: f64,
}

/// Bounded FIFO of latency samples. Pushing past capacity drops the
/// oldest sample.
#[derive(Debug, Clone)]
pub struct LatencyRing {
    samples: VecDeque<LatencySample>,
    capacity: usize,
}

impl LatencyRing {
    /// Create a ring holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, evicting the oldest when full
    pub fn push(&mut self, latency_ms: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(LatencySample {
            at: Utc::now(),
            latency_ms,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples oldest-first
    pub fn iter(&self) -> impl Iterator<Item = &LatencySample> {
        self.samples.iter()
    }

    /// Latency values oldest-first
    pub fn latencies(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.latency_ms)
    }

    /// Most recent sample
    pub fn last(&self) -> Option<&LatencySample> {
        self.samples.back()
    }

    /// Drop all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
