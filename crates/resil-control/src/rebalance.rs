//! Weight redistribution away from degraded paths
//!
//! Pure distribution math lives here; the controller orchestrates the
//! full failover sequence around it.

use crate::registry::DEGRADED_RESIDUAL_PCT;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Nodes shared by enough degraded paths to be treated as the common
/// bottleneck.
///
/// Each degraded path contributes its unique intermediate nodes once;
/// endpoints never count. A node qualifies when it appears in at least
/// `max(2, ceil(0.5 * |D|))` of the degraded paths, so a single degraded
/// path never yields a bottleneck. Results are ordered by occurrence
/// count descending, then node id.
pub fn find_bottleneck_nodes(degraded_paths: &[Vec<u32>]) -> Vec<u32> {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for path in degraded_paths {
        let unique: HashSet<u32> = resil_topology::paths::intermediates(path)
            .iter()
            .copied()
            .collect();
        for node in unique {
            *counts.entry(node).or_insert(0) += 1;
        }
    }

    let threshold = 2.max((degraded_paths.len() as f64 * 0.5).ceil() as usize);
    let mut bottlenecks: Vec<(u32, usize)> = counts
        .into_iter()
        .filter(|&(_, count)| count >= threshold)
        .collect();
    bottlenecks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    bottlenecks.into_iter().map(|(node, _)| node).collect()
}

/// New load split after pinning each degraded path to its residual share.
///
/// Degraded paths get `DEGRADED_RESIDUAL_PCT` each; the remaining paths
/// keep their relative proportion of the previous non-degraded mass,
/// scaled to fill what is left of 100%. When every path is degraded the
/// split is uniform. The result always sums to 100.
pub fn rebalanced_distribution(
    current: &BTreeMap<u32, f64>,
    degraded: &HashSet<u32>,
) -> BTreeMap<u32, f64> {
    if current.is_empty() {
        return BTreeMap::new();
    }

    let degraded_count = current.keys().filter(|id| degraded.contains(id)).count();
    let mut next = BTreeMap::new();

    if degraded_count == current.len() {
        // No healthy capacity left; hedge evenly across everything.
        let share = 100.0 / current.len() as f64;
        for &id in current.keys() {
            next.insert(id, share);
        }
        return next;
    }

    let healthy_budget = 100.0 - DEGRADED_RESIDUAL_PCT * degraded_count as f64;
    let healthy_mass: f64 = current
        .iter()
        .filter(|(id, _)| !degraded.contains(id))
        .map(|(_, &load)| load)
        .sum();

    let healthy_count = current.len() - degraded_count;
    for (&id, &load) in current {
        if degraded.contains(&id) {
            next.insert(id, DEGRADED_RESIDUAL_PCT);
        } else if healthy_mass > 0.0 {
            next.insert(id, healthy_budget * load / healthy_mass);
        } else {
            // Surviving paths carried no load before; split the budget evenly.
            next.insert(id, healthy_budget / healthy_count as f64);
        }
    }

    normalize(&mut next);
    next
}

/// Rescale a distribution in place so it sums to 100
pub fn normalize(distribution: &mut BTreeMap<u32, f64>) {
    let sum: f64 = distribution.values().sum();
    if sum <= 0.0 {
        return;
    }
    let scale = 100.0 / sum;
    for value in distribution.values_mut() {
        *value *= scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DISTRIBUTION_EPSILON;

    fn sum(d: &BTreeMap<u32, f64>) -> f64 {
        d.values().sum()
    }

    #[test]
    fn test_bottleneck_shared_by_two_paths() {
        let degraded = vec![vec![1, 9, 19], vec![1, 9, 20]];
        assert_eq!(find_bottleneck_nodes(&degraded), vec![9]);
    }

    #[test]
    fn test_single_degraded_path_yields_no_bottleneck() {
        let degraded = vec![vec![1, 9, 19]];
        assert!(find_bottleneck_nodes(&degraded).is_empty());
    }

    #[test]
    fn test_endpoints_never_count_as_bottlenecks() {
        // Node 1 and 19/20 are shared endpoints; only 9 is intermediate.
        let degraded = vec![vec![1, 9, 19], vec![1, 9, 20], vec![1, 10, 19]];
        let bottlenecks = find_bottleneck_nodes(&degraded);
        assert_eq!(bottlenecks, vec![9]);
        assert!(!bottlenecks.contains(&1));
        assert!(!bottlenecks.contains(&19));
    }

    #[test]
    fn test_bottlenecks_sorted_by_count() {
        let degraded = vec![
            vec![1, 9, 10, 19],
            vec![1, 9, 10, 20],
            vec![2, 9, 11, 19],
            vec![2, 9, 11, 20],
        ];
        // 9 in 4 paths; 10 and 11 in 2 each (threshold = max(2, 2) = 2).
        let bottlenecks = find_bottleneck_nodes(&degraded);
        assert_eq!(bottlenecks, vec![9, 10, 11]);
    }

    #[test]
    fn test_duplicate_node_within_one_path_counts_once() {
        let degraded = vec![vec![1, 9, 9, 19], vec![2, 10, 20]];
        assert!(find_bottleneck_nodes(&degraded).is_empty());
    }

    #[test]
    fn test_rebalance_pins_degraded_and_rescales_rest() {
        let current: BTreeMap<u32, f64> = [(0, 50.0), (1, 30.0), (2, 20.0)].into_iter().collect();
        let degraded: HashSet<u32> = [0].into_iter().collect();

        let next = rebalanced_distribution(&current, &degraded);
        assert!((next[&0] - 5.0).abs() < DISTRIBUTION_EPSILON);
        // 95% split 30:20 -> 57:38.
        assert!((next[&1] - 57.0).abs() < DISTRIBUTION_EPSILON);
        assert!((next[&2] - 38.0).abs() < DISTRIBUTION_EPSILON);
        assert!((sum(&next) - 100.0).abs() < DISTRIBUTION_EPSILON);
    }

    #[test]
    fn test_rebalance_with_two_degraded() {
        let current: BTreeMap<u32, f64> = [(0, 50.0), (1, 30.0), (2, 20.0)].into_iter().collect();
        let degraded: HashSet<u32> = [0, 1].into_iter().collect();

        let next = rebalanced_distribution(&current, &degraded);
        assert!((next[&0] - 5.0).abs() < DISTRIBUTION_EPSILON);
        assert!((next[&1] - 5.0).abs() < DISTRIBUTION_EPSILON);
        assert!((next[&2] - 90.0).abs() < DISTRIBUTION_EPSILON);
    }

    #[test]
    fn test_all_degraded_splits_uniformly() {
        let current: BTreeMap<u32, f64> = [(0, 50.0), (1, 30.0), (2, 20.0)].into_iter().collect();
        let degraded: HashSet<u32> = [0, 1, 2].into_iter().collect();

        let next = rebalanced_distribution(&current, &degraded);
        for share in next.values() {
            assert!((share - 100.0 / 3.0).abs() < DISTRIBUTION_EPSILON);
        }
        assert!((sum(&next) - 100.0).abs() < DISTRIBUTION_EPSILON);
    }

    #[test]
    fn test_zero_healthy_mass_splits_budget_evenly() {
        let current: BTreeMap<u32, f64> = [(0, 100.0), (1, 0.0), (2, 0.0)].into_iter().collect();
        let degraded: HashSet<u32> = [0].into_iter().collect();

        let next = rebalanced_distribution(&current, &degraded);
        assert!((next[&0] - 5.0).abs() < DISTRIBUTION_EPSILON);
        assert!((next[&1] - 47.5).abs() < DISTRIBUTION_EPSILON);
        assert!((next[&2] - 47.5).abs() < DISTRIBUTION_EPSILON);
    }

    #[test]
    fn test_normalize() {
        let mut d: BTreeMap<u32, f64> = [(0, 2.0), (1, 2.0)].into_iter().collect();
        normalize(&mut d);
        assert!((d[&0] - 50.0).abs() < 1e-9);
        assert!((sum(&d) - 100.0).abs() < 1e-9);
    }
}
