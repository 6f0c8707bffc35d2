//! Shortest-path queries and path scoring
//!
//! Edge weight for all route queries is the link's current `delay_ms`, so
//! injected faults reshape routing decisions without touching the graph
//! structure.

use crate::graph::Topology;
use resil_core::{Error, Result, Tier};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

/// Pending Dijkstra visit, ordered as a min-heap on cost
#[derive(Debug, PartialEq)]
struct Visit {
    cost: f64,
    node: u32,
}

impl Eq for Visit {}

impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the cheapest visit first.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Topology {
    /// Cheapest path from `src` to `dst` by current link delay.
    ///
    /// The exclusion set is honoured for intermediate hops only; `src` and
    /// `dst` are never excluded even if listed. Returns the node-id
    /// sequence, or `None` when no route survives the exclusions.
    pub fn shortest_path(&self, src: u32, dst: u32, exclude: &HashSet<u32>) -> Option<Vec<u32>> {
        if self.node(src).is_err() || self.node(dst).is_err() {
            return None;
        }
        if src == dst {
            return Some(vec![src]);
        }

        let mut dist: HashMap<u32, f64> = HashMap::new();
        let mut prev: HashMap<u32, u32> = HashMap::new();
        let mut heap = BinaryHeap::new();

        dist.insert(src, 0.0);
        heap.push(Visit {
            cost: 0.0,
            node: src,
        });

        while let Some(Visit { cost, node }) = heap.pop() {
            if node == dst {
                let mut path = vec![dst];
                let mut current = dst;
                while let Some(&p) = prev.get(&current) {
                    path.push(p);
                    current = p;
                }
                path.reverse();
                return Some(path);
            }
            if cost > *dist.get(&node).unwrap_or(&f64::INFINITY) {
                continue;
            }

            for (next, link_idx) in self.neighbors(node) {
                // Exclusions apply to intermediates only.
                if next != dst && exclude.contains(&next) {
                    continue;
                }
                let next_cost = cost + self.link_at(link_idx).delay_ms;
                if next_cost < *dist.get(&next).unwrap_or(&f64::INFINITY) {
                    dist.insert(next, next_cost);
                    prev.insert(next, node);
                    heap.push(Visit {
                        cost: next_cost,
                        node: next,
                    });
                }
            }
        }
        None
    }

    /// Up to `k` paths from `src` to `dst` whose intermediate nodes are
    /// pairwise disjoint (`src` and `dst` may be shared).
    ///
    /// Each iteration re-runs the shortest-path query with all previously
    /// used intermediates excluded, stopping early when no route remains.
    /// This trades the optimality of a full Yen's search for robustness.
    pub fn k_disjoint_paths(
        &self,
        src: u32,
        dst: u32,
        k: usize,
        exclude: &HashSet<u32>,
    ) -> Vec<Vec<u32>> {
        let mut found = Vec::new();
        let mut used: HashSet<u32> = exclude.clone();

        for _ in 0..k {
            let Some(path) = self.shortest_path(src, dst, &used) else {
                break;
            };
            for &node in intermediates(&path) {
                used.insert(node);
            }
            found.push(path);
        }

        debug!(src, dst, k, found = found.len(), "disjoint path query");
        found
    }

    /// Total current delay along `path` in milliseconds
    pub fn path_latency(&self, path: &[u32]) -> Result<f64> {
        let mut total = 0.0;
        for pair in path.windows(2) {
            let link = self.link_between(pair[0], pair[1]).ok_or_else(|| {
                Error::no_path(format!("no link between {} and {}", pair[0], pair[1]))
            })?;
            total += link.delay_ms;
        }
        Ok(total)
    }

    /// Bottleneck capacity of `path`: the minimum `bandwidth * (1 - util)`
    /// across its links, in Mbps
    pub fn path_capacity(&self, path: &[u32]) -> Result<f64> {
        let mut capacity = f64::INFINITY;
        for pair in path.windows(2) {
            let link = self.link_between(pair[0], pair[1]).ok_or_else(|| {
                Error::no_path(format!("no link between {} and {}", pair[0], pair[1]))
            })?;
            capacity = capacity.min(link.available_bandwidth());
        }
        if capacity.is_infinite() {
            capacity = 0.0;
        }
        Ok(capacity)
    }

    /// Composite path score; higher is better.
    ///
    /// Rewards low latency, high bottleneck capacity, few hops, and idle
    /// nodes. Only the relative ordering of scores is meaningful.
    pub fn path_score(&self, path: &[u32]) -> Result<f64> {
        if path.len() < 2 {
            return Err(Error::no_path("path needs at least two nodes"));
        }
        let latency = self.path_latency(path)?.max(0.001);
        let capacity = self.path_capacity(path)?;
        let hops = (path.len() - 1) as f64;

        let mut util_sum = 0.0;
        for &id in path {
            util_sum += self.node(id)?.utilization;
        }
        let avg_util = util_sum / path.len() as f64;

        Ok(1000.0 / latency + 10.0 * capacity + 100.0 / hops + 100.0 * (1.0 - avg_util))
    }

    /// True iff tiers along `path` are non-decreasing, the first node is
    /// edge-tier, and the last is cloud-tier
    pub fn is_valid_path(&self, path: &[u32]) -> bool {
        let Some((&first, rest)) = path.split_first() else {
            return false;
        };
        let Ok(first_node) = self.node(first) else {
            return false;
        };
        if first_node.tier != Tier::Edge {
            return false;
        }

        let mut previous = first_node.tier;
        for &id in rest {
            let Ok(node) = self.node(id) else {
                return false;
            };
            if node.tier < previous {
                return false;
            }
            previous = node.tier;
        }
        previous == Tier::Cloud
    }
}

/// Intermediate nodes of a path (everything but the endpoints)
pub fn intermediates(path: &[u32]) -> &[u32] {
    if path.len() <= 2 {
        &[]
    } else {
        &path[1..path.len() - 1]
    }
}
