//! Gateway request counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Gateway statistics exposed at the stats endpoint
#[derive(Debug)]
pub struct GatewayStats {
    started_at: Instant,
    requests: AtomicU64,
    responses: AtomicU64,
    errors: AtomicU64,
    batches_dispatched: AtomicU64,
    events_accepted: AtomicU64,
    events_dropped: AtomicU64,
    failovers: AtomicU64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            responses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            events_accepted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            failovers: AtomicU64::new(0),
        }
    }

    pub fn increment_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_responses(&self) {
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failovers(&self) {
        self.failovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, accepted: usize, dropped: usize) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.events_accepted
            .fetch_add(accepted as u64, Ordering::Relaxed);
        self.events_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn responses(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn failovers(&self) -> u64 {
        self.failovers.load(Ordering::Relaxed)
    }

    pub fn batches_dispatched(&self) -> u64 {
        self.batches_dispatched.load(Ordering::Relaxed)
    }

    pub fn events_accepted(&self) -> u64 {
        self.events_accepted.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}
