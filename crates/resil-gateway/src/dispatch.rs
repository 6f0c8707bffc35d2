//! Ingress dispatcher
//!
//! Per-batch control flow for both routing modes. Decisions are computed
//! under the controller lock, which is always released before a
//! downstream call, a simulated transit sleep, or a cold spin-up sleep.

use crate::forward::Forwarder;
use crate::stats::GatewayStats;
use rand::Rng;
use resil_control::{Controller, PendingFailover, TriggerDecision};
use resil_core::{
    Error, EventBatch, IngressReply, Result, RoutingMode, TriggerReason,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Routes batches across the overlay or the physical pipeline
pub struct Dispatcher {
    controller: Arc<RwLock<Controller>>,
    forwarder: Arc<dyn Forwarder>,
    stats: Arc<GatewayStats>,
    routing_mode: RoutingMode,
    downstream_urls: BTreeMap<String, String>,
    ingress_timeout: Duration,
    /// Skip real transit sleeps; latency is still accounted
    virtual_time: bool,
}

impl Dispatcher {
    pub fn new(
        controller: Arc<RwLock<Controller>>,
        forwarder: Arc<dyn Forwarder>,
        stats: Arc<GatewayStats>,
        routing_mode: RoutingMode,
        downstream_urls: BTreeMap<String, String>,
        ingress_timeout: Duration,
    ) -> Self {
        Self {
            controller,
            forwarder,
            stats,
            routing_mode,
            downstream_urls,
            ingress_timeout,
            virtual_time: false,
        }
    }

    /// Account latency without sleeping; used by tests
    pub fn with_virtual_time(mut self) -> Self {
        self.virtual_time = true;
        self
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.routing_mode
    }

    /// Dispatch one validated batch
    pub async fn dispatch(&self, batch: EventBatch) -> Result<IngressReply> {
        batch.validate()?;
        match self.routing_mode {
            RoutingMode::Virtual => self.dispatch_virtual(batch).await,
            RoutingMode::Physical => self.dispatch_physical(batch).await,
        }
    }

    /// Serve a pending failover's spin-up (outside the lock), then account
    /// it.
    async fn finish_failover(&self, pending: PendingFailover) {
        if let Some(delay) = pending.spin_up_delay {
            if !self.virtual_time {
                tokio::time::sleep(delay).await;
            }
        }
        let mut controller = self.controller.write().await;
        controller.complete_failover(&pending, Instant::now());
        self.stats.increment_failovers();
    }

    /// Overlay routing: degradation scan, weighted path sample, simulated
    /// transit, telemetry update.
    async fn dispatch_virtual(&self, batch: EventBatch) -> Result<IngressReply> {
        let now = Instant::now();

        // Scan and possibly rebalance before routing this batch.
        let pending = {
            let mut controller = self.controller.write().await;
            controller.plan_rebalance(TriggerReason::LatencyDrift, now)
        };
        if let Some(pending) = pending {
            self.finish_failover(pending).await;
        }

        // Sample a path and estimate its latency under a read lock.
        let (path_id, route, latency_ms) = {
            let controller = self.controller.read().await;
            let draw: f64 = rand::thread_rng().gen_range(0.0..100.0);
            match controller.select_path(draw) {
                Some(path_id) => {
                    let latency = controller.estimate_path_latency(path_id)?;
                    let route = controller
                        .registry()
                        .get(path_id)
                        .map(|p| p.route_label())
                        .unwrap_or_default();
                    (Some(path_id), route, latency)
                }
                // Nothing registered: route ad hoc between endpoints
                // drawn fresh for this batch.
                None => {
                    let (route, latency) = self.ad_hoc_route(&controller)?;
                    (None, route, latency)
                }
            }
        };

        // Simulated end-to-end transit.
        if !self.virtual_time {
            tokio::time::sleep(Duration::from_secs_f64(latency_ms / 1000.0)).await;
        }

        {
            let mut controller = self.controller.write().await;
            controller.observe_batch(path_id, latency_ms, batch.len(), now);
            controller.evaluate_trigger(Instant::now());
            if let Some(deadline) = batch.min_deadline_ms() {
                if latency_ms > deadline as f64 {
                    let batch_id = batch.0.first().map(|e| e.id.clone()).unwrap_or_default();
                    controller.note_deadline_miss(batch_id, deadline, latency_ms);
                }
            }
        }

        self.stats.record_batch(batch.len(), 0);
        Ok(IngressReply::delivered(
            batch.len(),
            0,
            latency_ms,
            route,
            path_id,
        ))
    }

    /// Shortest-path fallback between random edge and cloud endpoints
    fn ad_hoc_route(&self, controller: &Controller) -> Result<(String, f64)> {
        let topology = controller.topology();
        let src = topology
            .random_edge_node()
            .ok_or_else(|| Error::no_path("no edge nodes in topology"))?;
        let dst = topology
            .random_cloud_node()
            .ok_or_else(|| Error::no_path("no cloud nodes in topology"))?;
        let path = topology
            .shortest_path(src, dst, &Default::default())
            .ok_or_else(|| Error::no_path(format!("no route from {} to {}", src, dst)))?;
        let latency = topology.path_latency(&path)?;
        let route = path
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("->");
        Ok((route, latency))
    }

    /// Physical pipeline routing: trigger check with active/backup swap,
    /// per-link delay and loss simulation, then forwarding to the
    /// first-hop tier server.
    async fn dispatch_physical(&self, batch: EventBatch) -> Result<IngressReply> {
        let now = Instant::now();

        let pending = {
            let mut controller = self.controller.write().await;
            match controller.evaluate_trigger(now) {
                TriggerDecision::Fired { reason } => {
                    Some(controller.plan_physical_failover(reason, now))
                }
                _ => None,
            }
        };
        if let Some(pending) = pending {
            self.finish_failover(pending).await;
        }

        // Walk the active route's links under a read lock.
        let (route, first_hop, mut delay_ms, survivors) = {
            let controller = self.controller.read().await;
            let active = controller
                .active_route()
                .ok_or_else(|| Error::no_path("no active physical route"))?
                .to_vec();
            let topology = controller.topology();

            let bytes = batch.approx_wire_bytes() as f64;
            let mut rng = rand::thread_rng();
            let mut delay = 0.0;
            let mut survivors = batch.len();

            for pair in active.windows(2) {
                let link = topology.link_between(pair[0], pair[1]).ok_or_else(|| {
                    Error::no_path(format!("no link between {} and {}", pair[0], pair[1]))
                })?;
                let bw_bps = link.bandwidth_mbps * 1_000_000.0;
                let transmission = if bw_bps > 0.0 {
                    (bytes * 8.0 / bw_bps) * 1000.0
                } else {
                    0.0
                };
                let jitter = if link.jitter_ms > 0.0 {
                    rng.gen_range(-link.jitter_ms..=link.jitter_ms)
                } else {
                    0.0
                };
                delay += transmission + link.delay_ms + jitter;

                if link.loss_rate > 0.0 {
                    let mut kept = 0;
                    for _ in 0..survivors {
                        if !rng.gen_bool(link.loss_rate.clamp(0.0, 1.0)) {
                            kept += 1;
                        }
                    }
                    survivors = kept;
                }
            }

            let first_hop = topology.node(active[0])?.physical_map.clone();
            let route = active
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("->");
            (route, first_hop, delay, survivors)
        };

        let dropped = batch.len() - survivors;
        if survivors == 0 {
            debug!(route = %route, dropped, "batch fully lost in transit");
            let mut controller = self.controller.write().await;
            controller.observe_batch(None, delay_ms, batch.len(), now);
            self.stats.record_batch(0, dropped);
            return Ok(IngressReply::all_lost(dropped, delay_ms, route));
        }

        // Forward the survivors; a timeout is not a failover signal, it
        // just shows up as a latency spike in the window.
        let surviving = EventBatch(batch.0[..survivors].to_vec());
        if let Some(url) = self.downstream_urls.get(&first_hop) {
            match self.forwarder.forward_batch(url, &surviving).await {
                Ok(()) => {}
                Err(Error::ForwardingTimeout(target)) => {
                    warn!(%target, "forward timed out; recording latency spike");
                    delay_ms += self.ingress_timeout.as_secs_f64() * 1000.0;
                }
                Err(e) => {
                    warn!(error = %e, "forward failed; recording latency spike");
                    delay_ms += self.ingress_timeout.as_secs_f64() * 1000.0;
                }
            }
        } else {
            warn!(tier = %first_hop, "no downstream URL for first hop");
        }

        {
            let mut controller = self.controller.write().await;
            controller.observe_batch(None, delay_ms, batch.len(), now);
            if let Some(deadline) = batch.min_deadline_ms() {
                if delay_ms > deadline as f64 {
                    let batch_id = batch.0.first().map(|e| e.id.clone()).unwrap_or_default();
                    controller.note_deadline_miss(batch_id, deadline, delay_ms);
                }
            }
        }

        self.stats.record_batch(survivors, dropped);
        Ok(IngressReply::delivered(
            survivors, dropped, delay_ms, route, None,
        ))
    }
}
