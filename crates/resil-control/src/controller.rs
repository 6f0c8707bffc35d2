//! Controller core
//!
//! Owns every piece of mutable control state: the path registry, the
//! aggregate latency window, the trigger debounce, node health, and the
//! physical active/backup routes. Callers serialise access through a
//! single lock and release it before any network I/O or simulated sleep;
//! the cold-mode spin-up is therefore split into `plan_rebalance` (under
//! lock) and `complete_failover` (after the caller has slept).

use crate::rebalance::{find_bottleneck_nodes, rebalanced_distribution};
use crate::registry::{PathRegistry, DISTRIBUTION_EPSILON};
use crate::revert::{distributions_equal, needs_revert, plan_revert, RevertSchedule, RevertStep};
use crate::trigger::{NodeHealth, TriggerDecision, TriggerEvaluator};
use rand::Rng;
use resil_core::{
    ControllerConfig, Error, FailoverMode, IncidentKind, PathStatus, PrimarySite, Result, Severity,
    Thresholds, TriggerReason,
};
use resil_telemetry::{LatencyRecord, LatencyStats, TelemetrySink};
use resil_topology::Topology;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A failover decided under the lock but not yet accounted.
///
/// Cold mode carries a spin-up delay the caller must serve (outside the
/// lock) before calling [`Controller::complete_failover`].
#[derive(Debug, Clone)]
pub struct PendingFailover {
    pub reason: TriggerReason,
    pub degraded_paths: Vec<u32>,
    pub bottleneck_nodes: Vec<u32>,
    pub alternatives: Vec<Vec<u32>>,
    pub severity: Severity,
    pub ewma_ms: f64,
    pub spin_up_delay: Option<Duration>,
    pub impacted_at: Option<Instant>,
}

/// Per-path slice of the state read endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PathView {
    pub path_id: u32,
    pub route: String,
    pub node_ids: Vec<u32>,
    pub status: PathStatus,
    pub load_percentage: f64,
    pub ewma: f64,
    pub slope: f64,
}

/// Snapshot returned by the state read endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStateView {
    pub ewma: f64,
    pub slope: f64,
    pub window_size: usize,
    pub thresholds: Thresholds,
    pub node_health: BTreeMap<u32, NodeHealth>,
    pub paths: Vec<PathView>,
    pub active_path: Option<String>,
    pub backup_path: Option<String>,
    pub mode: FailoverMode,
    pub primary: PrimarySite,
    pub failover_in_progress: bool,
    pub trigger_armed: bool,
}

/// The failover controller
pub struct Controller {
    config: ControllerConfig,
    topology: Topology,
    registry: PathRegistry,
    aggregate: LatencyStats,
    trigger: TriggerEvaluator,
    node_health: HashMap<u32, NodeHealth>,
    down_nodes: HashSet<u32>,
    sink: Arc<dyn TelemetrySink>,
    /// Most recent disjoint alternatives computed by a rebalance
    alternatives: Vec<Vec<u32>>,
    failover_in_progress: bool,
    /// First batch observed after the trigger began arming
    impacted_batch_at: Option<Instant>,
    active_route: Option<Vec<u32>>,
    backup_route: Option<Vec<u32>>,
    failover_mode: FailoverMode,
    primary: PrimarySite,
}

impl Controller {
    /// Create a controller over a loaded topology
    pub fn new(
        config: ControllerConfig,
        topology: Topology,
        sink: Arc<dyn TelemetrySink>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = PathRegistry::new(config.window, config.alpha);
        let aggregate = LatencyStats::new(config.window, config.alpha);
        let trigger = TriggerEvaluator::new(config.thresholds.clone());
        let failover_mode = config.failover_mode;
        let primary = config.primary;

        let mut controller = Self {
            config,
            topology,
            registry,
            aggregate,
            trigger,
            node_health: HashMap::new(),
            down_nodes: HashSet::new(),
            sink,
            alternatives: Vec::new(),
            failover_in_progress: false,
            impacted_batch_at: None,
            active_route: None,
            backup_route: None,
            failover_mode,
            primary,
        };
        controller.compute_physical_routes();
        Ok(controller)
    }

    /// Pick the active and backup routes for physical forwarding: the two
    /// best disjoint valid routes between the lowest-id edge and cloud
    /// nodes.
    fn compute_physical_routes(&mut self) {
        let (Some(&src), Some(&dst)) = (
            self.topology.edge_nodes().first(),
            self.topology.cloud_nodes().first(),
        ) else {
            return;
        };
        let mut routes = self.topology.k_disjoint_paths(src, dst, 2, &HashSet::new());
        routes.retain(|r| self.topology.is_valid_path(r));
        let mut iter = routes.into_iter();
        self.active_route = iter.next();
        self.backup_route = iter.next();
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PathRegistry {
        &mut self.registry
    }

    pub fn failover_mode(&self) -> FailoverMode {
        self.failover_mode
    }

    /// Runtime-mutable failover mode
    pub fn set_failover_mode(&mut self, mode: FailoverMode) {
        info!(%mode, "failover mode changed");
        self.failover_mode = mode;
    }

    pub fn primary(&self) -> PrimarySite {
        self.primary
    }

    /// Runtime-mutable primary site
    pub fn set_primary(&mut self, primary: PrimarySite) {
        info!(%primary, "primary site changed");
        self.primary = primary;
    }

    /// Disjoint alternatives computed by the most recent rebalance
    pub fn alternatives(&self) -> &[Vec<u32>] {
        &self.alternatives
    }

    pub fn active_route(&self) -> Option<&[u32]> {
        self.active_route.as_deref()
    }

    pub fn backup_route(&self) -> Option<&[u32]> {
        self.backup_route.as_deref()
    }

    /// Swap the physical active and backup routes
    pub fn swap_active_backup(&mut self) {
        std::mem::swap(&mut self.active_route, &mut self.backup_route);
        info!(
            active = ?self.active_route,
            backup = ?self.backup_route,
            "active/backup routes swapped"
        );
    }

    /// Register a forwarding path with its optimal load share.
    ///
    /// The node sequence must traverse tiers edge -> cloud in
    /// non-decreasing order.
    pub fn register_path(&mut self, path_id: u32, node_ids: Vec<u32>, load_pct: f64) -> Result<()> {
        if !self.topology.is_valid_path(&node_ids) {
            return Err(Error::invalid_payload(format!(
                "path {:?} violates tier order or endpoints",
                node_ids
            )));
        }
        self.registry.register(path_id, node_ids, load_pct);
        Ok(())
    }

    /// Feed one batch latency into the aggregate and per-path windows
    pub fn observe_batch(
        &mut self,
        path_id: Option<u32>,
        latency_ms: f64,
        batch_len: usize,
        now: Instant,
    ) {
        self.aggregate.record(latency_ms);
        if let Some(id) = path_id {
            self.registry.record_latency(id, latency_ms);
        }
        if self.trigger.trigger_start().is_some() && self.impacted_batch_at.is_none() {
            self.impacted_batch_at = Some(now);
        }
        self.sink.record_latency(LatencyRecord {
            at: chrono::Utc::now(),
            path_id,
            latency_ms,
            batch_len,
        });
    }

    /// Evaluate the failover trigger against aggregate telemetry
    pub fn evaluate_trigger(&mut self, now: Instant) -> TriggerDecision {
        let decision = self.trigger.evaluate(
            self.aggregate.ewma(),
            self.aggregate.slope(),
            &self.node_health,
            now,
        );
        match decision {
            TriggerDecision::Arming { .. } | TriggerDecision::Fired { .. } => {
                if self.impacted_batch_at.is_none() {
                    self.impacted_batch_at = Some(now);
                }
            }
            TriggerDecision::Idle => {}
        }
        decision
    }

    /// Aggregate statistics snapshot
    pub fn aggregate_ewma(&self) -> Option<f64> {
        self.aggregate.ewma()
    }

    pub fn aggregate_slope(&self) -> f64 {
        self.aggregate.slope()
    }

    /// Scan for degraded paths and, if any newly degraded, redistribute
    /// load away from them.
    ///
    /// Runs entirely under the caller's lock: bottleneck identification,
    /// disjoint alternative recomputation, weight assignment, and the
    /// telemetry/debounce reset. The returned [`PendingFailover`] still
    /// needs [`Controller::complete_failover`] after any spin-up delay
    /// has been served.
    pub fn plan_rebalance(
        &mut self,
        reason: TriggerReason,
        now: Instant,
    ) -> Option<PendingFailover> {
        let newly_degraded = self.registry.degradation_scan(&self.config.thresholds, now);
        if newly_degraded.is_empty() {
            return None;
        }

        let degraded: Vec<u32> = self
            .registry
            .iter()
            .filter(|p| p.status == PathStatus::Degraded)
            .map(|p| p.path_id)
            .collect();
        let degraded_routes: Vec<Vec<u32>> = self
            .registry
            .iter()
            .filter(|p| p.status == PathStatus::Degraded)
            .map(|p| p.node_ids.clone())
            .collect();

        let bottlenecks = find_bottleneck_nodes(&degraded_routes);

        // Recompute disjoint alternatives around the bottleneck set, from
        // the first degraded route's endpoints.
        let exclude: HashSet<u32> = bottlenecks.iter().copied().collect();
        let mut alternatives = Vec::new();
        if let Some(route) = degraded_routes.first() {
            if let (Some(&src), Some(&dst)) = (route.first(), route.last()) {
                alternatives = self.topology.k_disjoint_paths(
                    src,
                    dst,
                    self.config.dispatch_candidates,
                    &exclude,
                );
                alternatives.retain(|p| self.topology.is_valid_path(p));
                alternatives.sort_by(|a, b| {
                    let sa = self.topology.path_score(a).unwrap_or(0.0);
                    let sb = self.topology.path_score(b).unwrap_or(0.0);
                    sb.total_cmp(&sa)
                });
            }
        }
        if alternatives.is_empty() {
            warn!(
                ?bottlenecks,
                "no valid alternative routes; redistributing across registered paths only"
            );
        }
        self.alternatives = alternatives.clone();

        let degraded_set: HashSet<u32> = degraded.iter().copied().collect();
        let next = rebalanced_distribution(&self.registry.distribution(), &degraded_set);
        self.registry.set_distribution(&next);
        debug_assert!((self.registry.distribution_sum() - 100.0).abs() <= DISTRIBUTION_EPSILON);

        let ewma_ms = self.aggregate.ewma().unwrap_or(0.0);
        let severity = if ewma_ms > 1.5 * self.config.thresholds.ewma_max_ms {
            Severity::High
        } else {
            Severity::Medium
        };

        let spin_up_delay = match self.failover_mode {
            FailoverMode::Cold => Some(Duration::from_millis(
                rand::thread_rng().gen_range(400..=700),
            )),
            _ => None,
        };

        warn!(
            ?degraded,
            ?bottlenecks,
            ewma_ms,
            "failover planned, load redistributed"
        );

        // Restart observation against the new path set.
        self.aggregate.reset();
        self.trigger.reset();
        self.failover_in_progress = true;

        Some(PendingFailover {
            reason,
            degraded_paths: degraded,
            bottleneck_nodes: bottlenecks,
            alternatives,
            severity,
            ewma_ms,
            spin_up_delay,
            impacted_at: self.impacted_batch_at,
        })
    }

    /// Swap active and backup physical routes after the trigger fires and
    /// restart observation, leaving incident accounting to
    /// [`Controller::complete_failover`] after any spin-up delay.
    pub fn plan_physical_failover(
        &mut self,
        reason: TriggerReason,
        _now: Instant,
    ) -> PendingFailover {
        self.swap_active_backup();

        let ewma_ms = self.aggregate.ewma().unwrap_or(0.0);
        let severity = if ewma_ms > 1.5 * self.config.thresholds.ewma_max_ms {
            Severity::High
        } else {
            Severity::Medium
        };
        let spin_up_delay = match self.failover_mode {
            FailoverMode::Cold => Some(Duration::from_millis(
                rand::thread_rng().gen_range(400..=700),
            )),
            _ => None,
        };

        self.aggregate.reset();
        self.trigger.reset();
        self.failover_in_progress = true;

        PendingFailover {
            reason,
            degraded_paths: Vec::new(),
            bottleneck_nodes: Vec::new(),
            alternatives: Vec::new(),
            severity,
            ewma_ms,
            spin_up_delay,
            impacted_at: self.impacted_batch_at,
        }
    }

    /// Account a planned failover: emit the incident (with MTTR measured
    /// from the first impacted batch) and clear the in-progress flag.
    pub fn complete_failover(&mut self, pending: &PendingFailover, now: Instant) -> u64 {
        let mttr_ms = pending
            .impacted_at
            .map(|t| now.duration_since(t).as_millis() as u64);
        let incident_id = self.sink.record_incident(
            pending.severity,
            IncidentKind::Failover {
                reason: pending.reason,
                degraded_paths: pending.degraded_paths.clone(),
                bottleneck_nodes: pending.bottleneck_nodes.clone(),
                ewma_ms: pending.ewma_ms,
                spin_up_delay_ms: pending.spin_up_delay.map(|d| d.as_millis() as u64),
                mttr_ms,
            },
        );
        self.failover_in_progress = false;
        self.impacted_batch_at = None;
        incident_id
    }

    /// Advance recovery transitions and, when capacity has returned and
    /// the load split has drifted from target, plan a gradual revert.
    ///
    /// With every path degraded the target is a uniform split; otherwise
    /// it is the optimal distribution recorded at registration.
    pub fn recovery_tick(&mut self, now: Instant) -> Option<RevertSchedule> {
        self.registry.recovery_transitions(
            &self.config.thresholds,
            self.config.hold_recovery,
            self.config.stability,
            now,
        );

        if self.registry.is_empty() {
            return None;
        }
        let target = if self.registry.all_degraded() {
            self.registry.uniform_distribution()
        } else {
            self.registry.optimal_distribution().clone()
        };
        let current = self.registry.distribution();
        if !needs_revert(&current, &target) {
            return None;
        }

        info!(?target, "gradual revert scheduled");
        Some(plan_revert(
            &current,
            &target,
            self.config.revert_steps,
            self.config.transition_duration,
            now,
        ))
    }

    /// Apply one revert step; returns false when the step matches the
    /// current distribution and nothing changes.
    pub fn apply_revert_step(&mut self, step: &RevertStep) -> bool {
        if distributions_equal(&self.registry.distribution(), &step.distribution) {
            return false;
        }
        self.registry.set_distribution(&step.distribution);
        debug_assert!((self.registry.distribution_sum() - 100.0).abs() <= DISTRIBUTION_EPSILON);
        true
    }

    /// Record that a batch overshot its delivery deadline
    pub fn note_deadline_miss(&mut self, batch_id: String, deadline_ms: u64, observed_ms: f64) {
        warn!(%batch_id, deadline_ms, observed_ms, "deadline missed");
        self.sink.record_incident(
            Severity::Medium,
            IncidentKind::DeadlineMiss {
                batch_id,
                deadline_ms,
                observed_ms,
            },
        );
    }

    /// Record a health reading for a node; a node coming back from down
    /// raises a recovery incident.
    pub fn set_node_health(&mut self, node_id: u32, health: NodeHealth) {
        if self.down_nodes.remove(&node_id) {
            self.sink
                .record_incident(Severity::Medium, IncidentKind::NodeRecover { node_id });
        }
        self.node_health.insert(node_id, health);
    }

    /// Mark a node unreachable; the first miss raises a down incident.
    pub fn mark_node_down(&mut self, node_id: u32) {
        if self.down_nodes.insert(node_id) {
            self.sink
                .record_incident(Severity::High, IncidentKind::NodeDown { node_id });
        }
    }

    /// Ranked dispatch candidates: up to `k` registered paths sorted by
    /// current topology score, each with its load share.
    pub fn ranked_candidates(&self, k: usize) -> Vec<(u32, f64, f64)> {
        let mut candidates: Vec<(u32, f64, f64)> = self
            .registry
            .iter()
            .map(|p| {
                let score = self.topology.path_score(&p.node_ids).unwrap_or(0.0);
                (p.path_id, p.load_percentage, score)
            })
            .collect();
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
        candidates.truncate(k);
        candidates
    }

    /// Weighted selection across the ranked candidates: walk cumulative
    /// load bands until the one containing `u` (drawn from [0, 100)).
    /// Falls back to the last candidate when `u` overshoots the bands.
    pub fn select_path(&self, u: f64) -> Option<u32> {
        let candidates = self.ranked_candidates(self.config.dispatch_candidates);
        if candidates.is_empty() {
            return None;
        }
        let mut cumulative = 0.0;
        for (path_id, load, _) in &candidates {
            cumulative += load;
            if u < cumulative {
                return Some(*path_id);
            }
        }
        candidates.last().map(|(id, _, _)| *id)
    }

    /// Estimated end-to-end latency of a registered path from current
    /// link delays
    pub fn estimate_path_latency(&self, path_id: u32) -> Result<f64> {
        let path = self
            .registry
            .get(path_id)
            .ok_or_else(|| Error::no_path(format!("path {} not registered", path_id)))?;
        self.topology.path_latency(&path.node_ids)
    }

    /// Snapshot for the state read endpoint
    pub fn state_view(&self) -> ControllerStateView {
        let route_label = |route: &Option<Vec<u32>>| {
            route.as_ref().map(|r| {
                r.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join("->")
            })
        };
        ControllerStateView {
            ewma: self.aggregate.ewma().unwrap_or(0.0),
            slope: self.aggregate.slope(),
            window_size: self.aggregate.window_size(),
            thresholds: self.config.thresholds.clone(),
            node_health: self.node_health.iter().map(|(&k, &v)| (k, v)).collect(),
            paths: self
                .registry
                .iter()
                .map(|p| PathView {
                    path_id: p.path_id,
                    route: p.route_label(),
                    node_ids: p.node_ids.clone(),
                    status: p.status,
                    load_percentage: p.load_percentage,
                    ewma: p.stats.ewma().unwrap_or(0.0),
                    slope: p.stats.slope(),
                })
                .collect(),
            active_path: route_label(&self.active_route),
            backup_path: route_label(&self.backup_route),
            mode: self.failover_mode,
            primary: self.primary,
            failover_in_progress: self.failover_in_progress,
            trigger_armed: self.trigger.trigger_start().is_some(),
        }
    }
}
