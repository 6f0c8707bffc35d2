//! Path registry and per-path health state machine
//!
//! Transitions move healthy -> degraded -> recovering -> healthy; a path
//! that worsens while recovering drops back to degraded. All transitions
//! happen here so the state machine has a single authority.

use resil_core::{PathStatus, Thresholds};
use resil_telemetry::LatencyStats;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Residual load pinned to a degraded path, in percent
pub const DEGRADED_RESIDUAL_PCT: f64 = 5.0;

/// Tolerance on the 100% distribution sum
pub const DISTRIBUTION_EPSILON: f64 = 0.01;

/// Per-path control state
#[derive(Debug, Clone)]
pub struct PathMetrics {
    pub path_id: u32,
    pub node_ids: Vec<u32>,
    pub stats: LatencyStats,
    pub load_percentage: f64,
    pub status: PathStatus,
    pub last_failure: Option<Instant>,
    pub last_recovery: Option<Instant>,
}

impl PathMetrics {
    fn new(path_id: u32, node_ids: Vec<u32>, load_percentage: f64, window: usize, alpha: f64) -> Self {
        Self {
            path_id,
            node_ids,
            stats: LatencyStats::new(window, alpha),
            load_percentage,
            status: PathStatus::Healthy,
            last_failure: None,
            last_recovery: None,
        }
    }

    /// Render the node sequence as "1->9->19"
    pub fn route_label(&self) -> String {
        self.node_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("->")
    }
}

/// Registry of forwarding paths under control
#[derive(Debug)]
pub struct PathRegistry {
    paths: BTreeMap<u32, PathMetrics>,
    /// Load split recorded at registration; the target of gradual revert
    optimal: BTreeMap<u32, f64>,
    window: usize,
    alpha: f64,
}

impl PathRegistry {
    pub fn new(window: usize, alpha: f64) -> Self {
        Self {
            paths: BTreeMap::new(),
            optimal: BTreeMap::new(),
            window,
            alpha,
        }
    }

    /// Register a path with its initial (optimal) load share.
    ///
    /// Registering an existing id overwrites the previous entry cleanly,
    /// including its recorded optimal share.
    pub fn register(&mut self, path_id: u32, node_ids: Vec<u32>, initial_load_pct: f64) {
        info!(path_id, load = initial_load_pct, "path registered");
        self.optimal.insert(path_id, initial_load_pct);
        self.paths.insert(
            path_id,
            PathMetrics::new(path_id, node_ids, initial_load_pct, self.window, self.alpha),
        );
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn get(&self, path_id: u32) -> Option<&PathMetrics> {
        self.paths.get(&path_id)
    }

    pub fn get_mut(&mut self, path_id: u32) -> Option<&mut PathMetrics> {
        self.paths.get_mut(&path_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathMetrics> {
        self.paths.values()
    }

    pub fn path_ids(&self) -> Vec<u32> {
        self.paths.keys().copied().collect()
    }

    /// Record one batch latency against a path's window
    pub fn record_latency(&mut self, path_id: u32, latency_ms: f64) {
        if let Some(path) = self.paths.get_mut(&path_id) {
            path.stats.record(latency_ms);
        }
    }

    /// True when every registered path is degraded
    pub fn all_degraded(&self) -> bool {
        !self.paths.is_empty()
            && self
                .paths
                .values()
                .all(|p| p.status == PathStatus::Degraded)
    }

    /// Paths whose window currently violates the drift thresholds and
    /// that are not already degraded; each transitions to degraded and
    /// stamps its failure time. Returns the ids that transitioned.
    pub fn degradation_scan(&mut self, thresholds: &Thresholds, now: Instant) -> Vec<u32> {
        let mut newly_degraded = Vec::new();
        for path in self.paths.values_mut() {
            if path.status == PathStatus::Degraded {
                continue;
            }
            let Some(ewma) = path.stats.ewma() else {
                continue;
            };
            if ewma > thresholds.ewma_max_ms && path.stats.slope() >= thresholds.slope_min_ms_per_s
            {
                warn!(
                    path_id = path.path_id,
                    ewma,
                    slope = path.stats.slope(),
                    from = %path.status,
                    "path degraded"
                );
                path.status = PathStatus::Degraded;
                path.last_failure = Some(now);
                newly_degraded.push(path.path_id);
            }
        }
        newly_degraded
    }

    /// Advance recovery transitions: degraded paths whose metrics have
    /// settled move to recovering after the failure hold window;
    /// recovering paths move back to healthy after the stability window.
    ///
    /// Returns (ids now recovering, ids now healthy).
    pub fn recovery_transitions(
        &mut self,
        thresholds: &Thresholds,
        hold_recovery: Duration,
        stability: Duration,
        now: Instant,
    ) -> (Vec<u32>, Vec<u32>) {
        let mut to_recovering = Vec::new();
        let mut to_healthy = Vec::new();

        for path in self.paths.values_mut() {
            match path.status {
                PathStatus::Degraded => {
                    let Some(ewma) = path.stats.ewma() else {
                        continue;
                    };
                    let held = path
                        .last_failure
                        .map(|t| now.duration_since(t) > hold_recovery)
                        .unwrap_or(false);
                    if ewma < 0.8 * thresholds.ewma_max_ms && path.stats.slope() <= 0.5 && held {
                        info!(path_id = path.path_id, ewma, "path recovering");
                        path.status = PathStatus::Recovering;
                        path.last_recovery = Some(now);
                        to_recovering.push(path.path_id);
                    }
                }
                PathStatus::Recovering => {
                    let Some(ewma) = path.stats.ewma() else {
                        continue;
                    };
                    let stable = path
                        .last_recovery
                        .map(|t| now.duration_since(t) > stability)
                        .unwrap_or(false);
                    if ewma < 0.6 * thresholds.ewma_max_ms && stable {
                        info!(path_id = path.path_id, ewma, "path healthy");
                        path.status = PathStatus::Healthy;
                        to_healthy.push(path.path_id);
                    }
                }
                PathStatus::Healthy => {}
            }
        }
        (to_recovering, to_healthy)
    }

    /// Current load split by path id
    pub fn distribution(&self) -> BTreeMap<u32, f64> {
        self.paths
            .iter()
            .map(|(&id, p)| (id, p.load_percentage))
            .collect()
    }

    /// Load split recorded at registration time
    pub fn optimal_distribution(&self) -> &BTreeMap<u32, f64> {
        &self.optimal
    }

    /// Even split across all registered paths
    pub fn uniform_distribution(&self) -> BTreeMap<u32, f64> {
        let n = self.paths.len();
        if n == 0 {
            return BTreeMap::new();
        }
        let share = 100.0 / n as f64;
        self.paths.keys().map(|&id| (id, share)).collect()
    }

    /// Apply a distribution to the registered paths, renormalising so the
    /// shares sum to 100. Ids absent from `distribution` get 0.
    pub fn set_distribution(&mut self, distribution: &BTreeMap<u32, f64>) {
        for (id, path) in self.paths.iter_mut() {
            path.load_percentage = distribution.get(id).copied().unwrap_or(0.0);
        }
        self.normalize();
    }

    /// Rescale shares so they sum to 100 within tolerance. A violation
    /// after a control step is a bug; it is logged and repaired rather
    /// than left to skew sampling.
    pub fn normalize(&mut self) {
        let sum: f64 = self.paths.values().map(|p| p.load_percentage).sum();
        if self.paths.is_empty() || sum <= 0.0 {
            return;
        }
        if (sum - 100.0).abs() > DISTRIBUTION_EPSILON {
            error!(sum, "load distribution drifted from 100%, renormalising");
        }
        let scale = 100.0 / sum;
        for path in self.paths.values_mut() {
            path.load_percentage *= scale;
        }
    }

    /// Sum of current shares
    pub fn distribution_sum(&self) -> f64 {
        self.paths.values().map(|p| p.load_percentage).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    fn registry_with_three_paths() -> PathRegistry {
        let mut registry = PathRegistry::new(10, 0.3);
        registry.register(0, vec![1, 9, 19], 50.0);
        registry.register(1, vec![1, 9, 20], 30.0);
        registry.register(2, vec![1, 10, 21], 20.0);
        registry
    }

    fn feed(registry: &mut PathRegistry, path_id: u32, latency: f64, count: usize) {
        for _ in 0..count {
            registry.record_latency(path_id, latency);
        }
    }

    /// Feed a rising ramp so both the EWMA and slope thresholds trip.
    fn feed_ramp(registry: &mut PathRegistry, path_id: u32) {
        for i in 0..10 {
            registry.record_latency(path_id, 100.0 + (i as f64) * 20.0);
        }
    }

    #[test]
    fn test_registration_records_optimal() {
        let registry = registry_with_three_paths();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.optimal_distribution()[&0], 50.0);
        assert_eq!(registry.get(0).unwrap().status, PathStatus::Healthy);
        assert_eq!(registry.get(0).unwrap().route_label(), "1->9->19");
    }

    #[test]
    fn test_reregistration_overwrites_cleanly() {
        let mut registry = registry_with_three_paths();
        feed_ramp(&mut registry, 0);
        registry.degradation_scan(&thresholds(), Instant::now());
        assert_eq!(registry.get(0).unwrap().status, PathStatus::Degraded);

        registry.register(0, vec![2, 10, 20], 40.0);
        let path = registry.get(0).unwrap();
        assert_eq!(path.status, PathStatus::Healthy);
        assert_eq!(path.node_ids, vec![2, 10, 20]);
        assert_eq!(path.stats.samples(), 0);
        assert_eq!(registry.optimal_distribution()[&0], 40.0);
    }

    #[test]
    fn test_degradation_scan_trips_on_drift() {
        let mut registry = registry_with_three_paths();
        feed_ramp(&mut registry, 0);
        feed(&mut registry, 1, 50.0, 10);

        let now = Instant::now();
        let degraded = registry.degradation_scan(&thresholds(), now);
        assert_eq!(degraded, vec![0]);
        assert_eq!(registry.get(0).unwrap().status, PathStatus::Degraded);
        assert_eq!(registry.get(0).unwrap().last_failure, Some(now));
        assert_eq!(registry.get(1).unwrap().status, PathStatus::Healthy);

        // Already-degraded paths are not re-reported.
        let again = registry.degradation_scan(&thresholds(), Instant::now());
        assert!(again.is_empty());
    }

    #[test]
    fn test_high_but_flat_latency_does_not_degrade() {
        let mut registry = registry_with_three_paths();
        // EWMA over threshold but slope ~ 0.
        feed(&mut registry, 0, 150.0, 10);
        let degraded = registry.degradation_scan(&thresholds(), Instant::now());
        assert!(degraded.is_empty());
    }

    #[test]
    fn test_recovery_requires_hold_then_stability() {
        let mut registry = registry_with_three_paths();
        let t0 = Instant::now();

        feed_ramp(&mut registry, 0);
        registry.degradation_scan(&thresholds(), t0);

        // Settle the window well under 0.8 * T with flat slope.
        feed(&mut registry, 0, 40.0, 10);

        // Before the failure hold expires nothing moves.
        let (recovering, _) = registry.recovery_transitions(
            &thresholds(),
            Duration::from_secs(20),
            Duration::from_secs(15),
            t0 + Duration::from_secs(19),
        );
        assert!(recovering.is_empty());

        // After the hold the path starts recovering.
        let t_rec = t0 + Duration::from_secs(21);
        let (recovering, healthy) = registry.recovery_transitions(
            &thresholds(),
            Duration::from_secs(20),
            Duration::from_secs(15),
            t_rec,
        );
        assert_eq!(recovering, vec![0]);
        assert!(healthy.is_empty());
        assert_eq!(registry.get(0).unwrap().status, PathStatus::Recovering);
        assert_eq!(registry.get(0).unwrap().last_recovery, Some(t_rec));

        // Stability window gates the final transition.
        let (_, healthy) = registry.recovery_transitions(
            &thresholds(),
            Duration::from_secs(20),
            Duration::from_secs(15),
            t_rec + Duration::from_secs(14),
        );
        assert!(healthy.is_empty());

        let (_, healthy) = registry.recovery_transitions(
            &thresholds(),
            Duration::from_secs(20),
            Duration::from_secs(15),
            t_rec + Duration::from_secs(16),
        );
        assert_eq!(healthy, vec![0]);
        assert_eq!(registry.get(0).unwrap().status, PathStatus::Healthy);
    }

    #[test]
    fn test_recovering_path_can_re_degrade() {
        let mut registry = registry_with_three_paths();
        let t0 = Instant::now();
        feed_ramp(&mut registry, 0);
        registry.degradation_scan(&thresholds(), t0);
        feed(&mut registry, 0, 40.0, 10);
        registry.recovery_transitions(
            &thresholds(),
            Duration::from_secs(20),
            Duration::from_secs(15),
            t0 + Duration::from_secs(21),
        );
        assert_eq!(registry.get(0).unwrap().status, PathStatus::Recovering);

        feed_ramp(&mut registry, 0);
        let degraded = registry.degradation_scan(&thresholds(), Instant::now());
        assert_eq!(degraded, vec![0]);
        assert_eq!(registry.get(0).unwrap().status, PathStatus::Degraded);
    }

    #[test]
    fn test_distribution_and_normalize() {
        let mut registry = registry_with_three_paths();
        assert!((registry.distribution_sum() - 100.0).abs() <= DISTRIBUTION_EPSILON);

        let skewed: BTreeMap<u32, f64> = [(0, 10.0), (1, 10.0), (2, 10.0)].into_iter().collect();
        registry.set_distribution(&skewed);
        assert!((registry.distribution_sum() - 100.0).abs() <= DISTRIBUTION_EPSILON);
        let dist = registry.distribution();
        assert!((dist[&0] - dist[&1]).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_distribution() {
        let registry = registry_with_three_paths();
        let uniform = registry.uniform_distribution();
        for share in uniform.values() {
            assert!((share - 100.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_all_degraded() {
        let mut registry = registry_with_three_paths();
        assert!(!registry.all_degraded());
        for id in [0, 1, 2] {
            feed_ramp(&mut registry, id);
        }
        registry.degradation_scan(&thresholds(), Instant::now());
        assert!(registry.all_degraded());
    }
}
