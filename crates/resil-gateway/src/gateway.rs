//! Gateway wiring
//!
//! Builds the controller over the loaded topology, registers the seed
//! paths, and runs the HTTP server beside the two background workers.

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::forward::{Forwarder, HttpForwarder};
use crate::server::{self, AppState};
use crate::stats::GatewayStats;
use crate::workers;
use resil_control::Controller;
use resil_core::{Error, Result};
use resil_telemetry::InMemorySink;
use resil_topology::Topology;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::info;

/// The assembled gateway
pub struct Gateway {
    config: GatewayConfig,
    controller: Arc<RwLock<Controller>>,
    dispatcher: Arc<Dispatcher>,
    sink: Arc<InMemorySink>,
    stats: Arc<GatewayStats>,
    forwarder: Arc<dyn Forwarder>,
}

impl Gateway {
    /// Assemble a gateway from configuration. Topology load failure is
    /// fatal.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let topology = Topology::load(&config.topology_path)?;
        Self::with_topology(config, topology)
    }

    /// Assemble a gateway over an already-built topology
    pub fn with_topology(config: GatewayConfig, topology: Topology) -> Result<Self> {
        config.validate()?;
        let sink = Arc::new(InMemorySink::new());
        let stats = Arc::new(GatewayStats::new());
        let forwarder: Arc<dyn Forwarder> = Arc::new(HttpForwarder::new(
            config.ingress_timeout,
            config.health_timeout,
        ));

        let mut controller = Controller::new(config.controller.clone(), topology, sink.clone())?;
        Self::register_paths(&config, &mut controller)?;
        let controller = Arc::new(RwLock::new(controller));

        let dispatcher = Arc::new(Dispatcher::new(
            controller.clone(),
            forwarder.clone(),
            stats.clone(),
            config.routing_mode,
            config.downstream_urls.clone(),
            config.ingress_timeout,
        ));

        Ok(Self {
            config,
            controller,
            dispatcher,
            sink,
            stats,
            forwarder,
        })
    }

    /// Register the configured seed paths, or derive disjoint routes from
    /// the topology when none are configured.
    fn register_paths(config: &GatewayConfig, controller: &mut Controller) -> Result<()> {
        if !config.seed_paths.is_empty() {
            for seed in &config.seed_paths {
                controller.register_path(seed.id, seed.nodes.clone(), seed.load_pct)?;
            }
            controller.registry_mut().normalize();
            return Ok(());
        }

        let topology = controller.topology();
        let (Some(&src), Some(&dst)) = (
            topology.edge_nodes().first(),
            topology.cloud_nodes().first(),
        ) else {
            return Err(Error::topology_load("topology has no edge or cloud nodes"));
        };
        let mut routes =
            topology.k_disjoint_paths(src, dst, config.controller.dispatch_candidates, &HashSet::new());
        routes.retain(|r| topology.is_valid_path(r));
        if routes.is_empty() {
            return Err(Error::no_path("no valid routes to seed the registry"));
        }

        // Split load proportionally to each route's score.
        let scores: Vec<f64> = routes
            .iter()
            .map(|r| topology.path_score(r).unwrap_or(0.0).max(0.0))
            .collect();
        let total: f64 = scores.iter().sum();
        let loads: Vec<f64> = if total > 0.0 {
            scores.iter().map(|s| 100.0 * s / total).collect()
        } else {
            vec![100.0 / routes.len() as f64; routes.len()]
        };

        for (id, (route, load)) in routes.into_iter().zip(loads).enumerate() {
            info!(path_id = id as u32, ?route, load, "seeding derived path");
            controller.register_path(id as u32, route, load)?;
        }
        Ok(())
    }

    pub fn controller(&self) -> &Arc<RwLock<Controller>> {
        &self.controller
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> &Arc<GatewayStats> {
        &self.stats
    }

    pub fn sink(&self) -> &Arc<InMemorySink> {
        &self.sink
    }

    /// Run the HTTP server and background workers until shutdown
    pub async fn serve(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let health_handle = tokio::spawn(workers::run_health_poller(
            self.controller.clone(),
            self.forwarder.clone(),
            self.config.downstream_urls.clone(),
            self.config.health_poll_interval,
            shutdown_rx.clone(),
        ));
        let stepper_handle = tokio::spawn(workers::run_revert_stepper(
            self.controller.clone(),
            Duration::from_secs(1),
            shutdown_rx,
        ));

        let state = AppState {
            controller: self.controller.clone(),
            dispatcher: self.dispatcher.clone(),
            sink: self.sink.clone(),
            stats: self.stats.clone(),
        };
        let result = server::serve(state, &self.config.listen_addr()).await;

        let _ = shutdown_tx.send(true);
        let _ = health_handle.await;
        let _ = stepper_handle.await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfigBuilder;
    use resil_core::{LinkSpec, NodeSpec, Tier, TopologySpec};

    fn topology() -> Topology {
        let node = |id, tier| NodeSpec {
            id,
            tier,
            quality: "high".to_string(),
            physical_map: format!("n{}", id),
            cpu_ev_sec: 100.0,
            buffer_size: 1000,
        };
        let link = |u, v, delay_ms| LinkSpec {
            u,
            v,
            bw_mbps: 100.0,
            delay_ms,
            jitter_ms: 0.0,
            loss_rate: 0.0,
        };
        Topology::from_spec(&TopologySpec {
            nodes: vec![
                node(1, Tier::Edge),
                node(9, Tier::Core),
                node(10, Tier::Core),
                node(19, Tier::Cloud),
            ],
            links: vec![
                link(1, 9, 5.0),
                link(1, 10, 6.0),
                link(9, 19, 12.0),
                link(10, 19, 14.0),
            ],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_seed_paths_registered_and_normalised() {
        let config = GatewayConfigBuilder::new()
            .seed_path(0, vec![1, 9, 19], 60.0)
            .seed_path(1, vec![1, 10, 19], 60.0)
            .build();
        let gateway = Gateway::with_topology(config, topology()).unwrap();

        let controller = gateway.controller().read().await;
        let dist = controller.registry().distribution();
        assert_eq!(dist.len(), 2);
        assert!((dist[&0] - 50.0).abs() < 0.01);
        assert!((controller.registry().distribution_sum() - 100.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_derived_paths_when_no_seeds() {
        let config = GatewayConfigBuilder::new().build();
        let gateway = Gateway::with_topology(config, topology()).unwrap();

        let controller = gateway.controller().read().await;
        assert_eq!(controller.registry().len(), 2);
        assert!((controller.registry().distribution_sum() - 100.0).abs() < 0.01);
        // The faster route carries more load.
        let dist = controller.registry().distribution();
        assert!(dist[&0] > dist[&1]);
    }

    #[tokio::test]
    async fn test_invalid_seed_path_is_fatal() {
        let config = GatewayConfigBuilder::new()
            .seed_path(0, vec![9, 1, 19], 100.0)
            .build();
        assert!(Gateway::with_topology(config, topology()).is_err());
    }
}
