//! Topology store
//!
//! Owns all nodes and links. Adjacency is materialised over link indices
//! so both directions of an undirected link observe the same record.

use rand::seq::SliceRandom;
use resil_core::{Error, Link, Node, Result, Tier, TopologySpec};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, info, warn};

/// The overlay topology the gateway forwards across
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: HashMap<u32, Node>,
    links: Vec<Link>,
    /// node id -> indices into `links`
    adjacency: HashMap<u32, Vec<usize>>,
}

impl Topology {
    /// Build a topology from a parsed descriptor.
    ///
    /// Fails on duplicate node ids, links referencing unknown nodes, or a
    /// graph with no edge-to-cloud route. Load failure is fatal to startup.
    pub fn from_spec(spec: &TopologySpec) -> Result<Self> {
        let mut nodes = HashMap::with_capacity(spec.nodes.len());
        for node_spec in &spec.nodes {
            let node = Node::from_spec(node_spec);
            if nodes.insert(node.id, node).is_some() {
                return Err(Error::topology_load(format!(
                    "duplicate node id {}",
                    node_spec.id
                )));
            }
        }

        let mut links = Vec::with_capacity(spec.links.len());
        let mut adjacency: HashMap<u32, Vec<usize>> = HashMap::new();
        for link_spec in &spec.links {
            for endpoint in [link_spec.u, link_spec.v] {
                if !nodes.contains_key(&endpoint) {
                    return Err(Error::topology_load(format!(
                        "link {}-{} references unknown node {}",
                        link_spec.u, link_spec.v, endpoint
                    )));
                }
            }
            let index = links.len();
            links.push(Link::from_spec(link_spec));
            adjacency.entry(link_spec.u).or_default().push(index);
            adjacency.entry(link_spec.v).or_default().push(index);
        }

        let topology = Self {
            nodes,
            links,
            adjacency,
        };

        if !topology.has_edge_to_cloud_route() {
            return Err(Error::topology_load(
                "no route exists from any edge node to any cloud node",
            ));
        }

        info!(
            nodes = topology.nodes.len(),
            links = topology.links.len(),
            "topology loaded"
        );
        Ok(topology)
    }

    /// Load a topology descriptor from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::topology_load(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let spec: TopologySpec = serde_json::from_str(&raw)
            .map_err(|e| Error::topology_load(format!("descriptor parse: {}", e)))?;
        Self::from_spec(&spec)
    }

    /// Breadth-first reachability from every edge node; true when at least
    /// one cloud node is reachable.
    fn has_edge_to_cloud_route(&self) -> bool {
        let mut queue: VecDeque<u32> = self
            .nodes
            .values()
            .filter(|n| n.tier == Tier::Edge)
            .map(|n| n.id)
            .collect();
        let mut seen: HashSet<u32> = queue.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if self.nodes[&current].tier == Tier::Cloud {
                return true;
            }
            for &link_idx in self.adjacency.get(&current).into_iter().flatten() {
                if let Some(next) = self.links[link_idx].other_endpoint(current) {
                    if seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        false
    }

    /// Look up a node by id
    pub fn node(&self, id: u32) -> Result<&Node> {
        self.nodes.get(&id).ok_or(Error::UnknownNode(id))
    }

    /// All nodes, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All links
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The link record joining `u` and `v`, if one exists
    pub fn link_between(&self, u: u32, v: u32) -> Option<&Link> {
        self.adjacency
            .get(&u)?
            .iter()
            .map(|&i| &self.links[i])
            .find(|l| l.touches(v))
    }

    /// Neighbouring (node id, link index) pairs of `node_id`
    pub(crate) fn neighbors(&self, node_id: u32) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.adjacency
            .get(&node_id)
            .into_iter()
            .flatten()
            .filter_map(move |&i| self.links[i].other_endpoint(node_id).map(|n| (n, i)))
    }

    pub(crate) fn link_at(&self, index: usize) -> &Link {
        &self.links[index]
    }

    /// Node ids of all edge-tier nodes
    pub fn edge_nodes(&self) -> Vec<u32> {
        self.tier_nodes(Tier::Edge)
    }

    /// Node ids of all cloud-tier nodes
    pub fn cloud_nodes(&self) -> Vec<u32> {
        self.tier_nodes(Tier::Cloud)
    }

    fn tier_nodes(&self, tier: Tier) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .nodes
            .values()
            .filter(|n| n.tier == tier)
            .map(|n| n.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Pick a random edge node. Endpoints are re-drawn per batch.
    pub fn random_edge_node(&self) -> Option<u32> {
        self.edge_nodes().choose(&mut rand::thread_rng()).copied()
    }

    /// Pick a random cloud node. Endpoints are re-drawn per batch.
    pub fn random_cloud_node(&self) -> Option<u32> {
        self.cloud_nodes().choose(&mut rand::thread_rng()).copied()
    }

    /// Point update of a node's utilisation from telemetry
    pub fn set_node_utilization(&mut self, id: u32, utilization: f64) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
        node.utilization = utilization.clamp(0.0, 1.0);
        Ok(())
    }

    /// Point update of a link's utilisation from telemetry
    pub fn set_link_utilization(&mut self, u: u32, v: u32, utilization: f64) -> Result<()> {
        let link = self
            .adjacency
            .get(&u)
            .and_then(|idxs| idxs.iter().copied().find(|&i| self.links[i].touches(v)))
            .ok_or_else(|| Error::no_path(format!("no link between {} and {}", u, v)))?;
        self.links[link].utilization = utilization.clamp(0.0, 1.0);
        Ok(())
    }

    /// Add `delta_ms` of delay to every link incident to `node_id`.
    ///
    /// The first injection on a link snapshots its current delay; repeated
    /// injections stack on top of that snapshot. Returns how many links
    /// were touched.
    pub fn inject_node_latency_fault(&mut self, node_id: u32, delta_ms: f64) -> Result<usize> {
        if !self.nodes.contains_key(&node_id) {
            return Err(Error::UnknownNode(node_id));
        }
        let indices: Vec<usize> = self
            .adjacency
            .get(&node_id)
            .cloned()
            .unwrap_or_default();
        for &i in &indices {
            let link = &mut self.links[i];
            if link.snapshot_delay_ms.is_none() {
                link.snapshot_delay_ms = Some(link.delay_ms);
            }
            link.delay_ms += delta_ms;
        }
        warn!(
            node_id,
            delta_ms,
            links = indices.len(),
            "latency fault injected"
        );
        Ok(indices.len())
    }

    /// Restore every link incident to `node_id` to its pre-fault delay
    pub fn remove_node_latency_fault(&mut self, node_id: u32) -> Result<usize> {
        if !self.nodes.contains_key(&node_id) {
            return Err(Error::UnknownNode(node_id));
        }
        let indices: Vec<usize> = self
            .adjacency
            .get(&node_id)
            .cloned()
            .unwrap_or_default();
        let mut restored = 0;
        for &i in &indices {
            let link = &mut self.links[i];
            if let Some(snapshot) = link.snapshot_delay_ms.take() {
                link.delay_ms = snapshot;
                restored += 1;
            }
        }
        debug!(node_id, restored, "latency fault removed");
        Ok(restored)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use resil_core::{LinkSpec, NodeSpec};
    use std::io::Write;

    pub(crate) fn three_tier_spec() -> TopologySpec {
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
            jitter_ms: 1.0,
            loss_rate: 0.001,
        };
        TopologySpec {
            nodes: vec![
                node(1, Tier::Edge),
                node(2, Tier::Edge),
                node(9, Tier::Core),
                node(10, Tier::Core),
                node(19, Tier::Cloud),
                node(20, Tier::Cloud),
            ],
            links: vec![
                link(1, 9, 5.0),
                link(1, 10, 8.0),
                link(2, 10, 6.0),
                link(9, 19, 12.0),
                link(9, 20, 14.0),
                link(10, 19, 11.0),
                link(10, 20, 9.0),
            ],
        }
    }

    #[test]
    fn test_build_and_lookup() {
        let topo = Topology::from_spec(&three_tier_spec()).unwrap();
        assert_eq!(topo.node_count(), 6);
        assert_eq!(topo.node(9).unwrap().tier, Tier::Core);
        assert!(matches!(topo.node(42), Err(Error::UnknownNode(42))));
        assert_eq!(topo.edge_nodes(), vec![1, 2]);
        assert_eq!(topo.cloud_nodes(), vec![19, 20]);
    }

    #[test]
    fn test_adjacency_is_bidirectional() {
        let topo = Topology::from_spec(&three_tier_spec()).unwrap();
        assert!(topo.link_between(1, 9).is_some());
        assert!(topo.link_between(9, 1).is_some());
        assert!(topo.link_between(1, 19).is_none());
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut spec = three_tier_spec();
        spec.nodes.push(spec.nodes[0].clone());
        assert!(matches!(
            Topology::from_spec(&spec),
            Err(Error::TopologyLoad(_))
        ));
    }

    #[test]
    fn test_dangling_link_rejected() {
        let mut spec = three_tier_spec();
        spec.links.push(LinkSpec {
            u: 1,
            v: 99,
            bw_mbps: 10.0,
            delay_ms: 1.0,
            jitter_ms: 0.0,
            loss_rate: 0.0,
        });
        assert!(matches!(
            Topology::from_spec(&spec),
            Err(Error::TopologyLoad(_))
        ));
    }

    #[test]
    fn test_disconnected_graph_rejected() {
        // Sever every core->cloud link; edge can no longer reach cloud.
        let mut spec = three_tier_spec();
        spec.links.retain(|l| l.v != 19 && l.v != 20);
        assert!(matches!(
            Topology::from_spec(&spec),
            Err(Error::TopologyLoad(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let spec = three_tier_spec();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&spec).unwrap()).unwrap();

        let topo = Topology::load(file.path()).unwrap();
        assert_eq!(topo.node_count(), 6);

        assert!(matches!(
            Topology::load("/nonexistent/topology.json"),
            Err(Error::TopologyLoad(_))
        ));
    }

    #[test]
    fn test_utilization_updates_seen_from_both_directions() {
        let mut topo = Topology::from_spec(&three_tier_spec()).unwrap();
        topo.set_link_utilization(9, 1, 0.4).unwrap();
        assert_eq!(topo.link_between(1, 9).unwrap().utilization, 0.4);
        assert_eq!(topo.link_between(9, 1).unwrap().utilization, 0.4);

        topo.set_node_utilization(9, 1.7).unwrap();
        assert_eq!(topo.node(9).unwrap().utilization, 1.0);
        assert!(topo.set_node_utilization(99, 0.5).is_err());
    }

    #[test]
    fn test_fault_inject_and_remove_round_trip() {
        let mut topo = Topology::from_spec(&three_tier_spec()).unwrap();
        let before: Vec<f64> = topo.links().iter().map(|l| l.delay_ms).collect();

        let touched = topo.inject_node_latency_fault(9, 40.0).unwrap();
        assert_eq!(touched, 3);
        assert_eq!(topo.link_between(1, 9).unwrap().delay_ms, 45.0);
        assert_eq!(topo.link_between(9, 19).unwrap().delay_ms, 52.0);

        // Stacked injection keeps the original snapshot.
        topo.inject_node_latency_fault(9, 10.0).unwrap();
        assert_eq!(topo.link_between(1, 9).unwrap().delay_ms, 55.0);

        topo.remove_node_latency_fault(9).unwrap();
        let after: Vec<f64> = topo.links().iter().map(|l| l.delay_ms).collect();
        assert_eq!(before, after);

        assert!(matches!(
            topo.inject_node_latency_fault(404, 5.0),
            Err(Error::UnknownNode(404))
        ));
    }

    #[test]
    fn test_random_endpoints_come_from_right_tiers() {
        let topo = Topology::from_spec(&three_tier_spec()).unwrap();
        for _ in 0..20 {
            let edge = topo.random_edge_node().unwrap();
            let cloud = topo.random_cloud_node().unwrap();
            assert_eq!(topo.node(edge).unwrap().tier, Tier::Edge);
            assert_eq!(topo.node(cloud).unwrap().tier, Tier::Cloud);
        }
    }
}
