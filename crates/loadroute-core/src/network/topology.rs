use std::collections::HashSet;

use petgraph::graph::{NodeIndex, UnGraph};
use rustc_hash::FxHashMap;

use crate::ident::Port;
use crate::network::types::{Link, NodeId, NodeKind, NodePair};
use crate::store::UsageStore;
use crate::units::Mbps;

/// A validated, immutable network topology.
///
/// Links keep the order they were declared in: the port of a link on either of its endpoints is
/// the link's 1-based position in that order.
#[derive(Debug, Clone)]
pub struct Topology {
    hosts: Vec<NodeId>,
    switches: Vec<NodeId>,
    links: Vec<Link>,
    pub(crate) graph: UnGraph<NodeId, usize>,
    id2idx: FxHashMap<NodeId, NodeIndex>,
}

impl Topology {
    /// Creates a network topology from lists of hosts, switches and links. This function returns
    /// an error if the given specification fails to produce a valid topology. The checks are not
    /// exhaustive.
    ///
    /// Correctness properties:
    ///
    /// - Every node must have a unique ID.
    /// - Hosts and switches must be declared in the list matching their kind.
    /// - Every link must have distinct endpoints among the declared nodes.
    /// - Every node must be referenced by some link.
    /// - For any two nodes, there must be at most one link between them.
    pub fn new(hosts: &[NodeId], switches: &[NodeId], links: &[Link]) -> Result<Self, TopologyError> {
        let mut g = UnGraph::default();
        let mut id2idx = FxHashMap::default();
        let declared = hosts
            .iter()
            .map(|&id| (id, NodeKind::Host))
            .chain(switches.iter().map(|&id| (id, NodeKind::Switch)));
        for (id, kind) in declared {
            // CORRECTNESS: Hosts and switches must be declared in the list matching their kind.
            if id.kind() != kind {
                return Err(TopologyError::WrongKind { id, expected: kind });
            }
            let idx = g.add_node(id);
            if id2idx.insert(id, idx).is_some() {
                // CORRECTNESS: Every node must have a unique ID.
                return Err(TopologyError::DuplicateNodeId(id));
            }
        }
        let mut referenced_nodes = HashSet::new();
        let mut seen_pairs = HashSet::new();
        for (i, &Link { a, b, .. }) in links.iter().enumerate() {
            // CORRECTNESS: Every link must have distinct endpoints among the declared nodes.
            if a == b {
                return Err(TopologyError::NodeAdjacentSelf(a));
            }
            let ia = *id2idx.get(&a).ok_or(TopologyError::UndeclaredNode(a))?;
            let ib = *id2idx.get(&b).ok_or(TopologyError::UndeclaredNode(b))?;
            // CORRECTNESS: For any two nodes, there must be at most one link between them.
            if !seen_pairs.insert(NodePair::new(a, b)) {
                return Err(TopologyError::DuplicateLink { n1: a, n2: b });
            }
            referenced_nodes.insert(a);
            referenced_nodes.insert(b);
            g.add_edge(ia, ib, i);
        }
        // CORRECTNESS: Every node must be referenced by some link.
        for id in hosts.iter().chain(switches) {
            if !referenced_nodes.contains(id) {
                return Err(TopologyError::IsolatedNode(*id));
            }
        }
        Ok(Self {
            hosts: hosts.to_vec(),
            switches: switches.to_vec(),
            links: links.to_vec(),
            graph: g,
            id2idx,
        })
    }

    pub fn hosts(&self) -> &[NodeId] {
        &self.hosts
    }

    pub fn switches(&self) -> &[NodeId] {
        &self.switches
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.id2idx.contains_key(&id)
    }

    /// Returns the neighbors of `id` in link declaration order.
    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        self.links_of(id).map(|(_, _, n)| n).collect()
    }

    /// Returns every link touching `id` in declaration order, together with the port it occupies
    /// and the node on its other end.
    pub fn links_of(&self, id: NodeId) -> impl Iterator<Item = (Port, &Link, NodeId)> + '_ {
        self.links.iter().enumerate().filter_map(move |(i, link)| {
            let other = if link.a == id {
                link.b
            } else if link.b == id {
                link.a
            } else {
                return None;
            };
            Some((port_of(i), link, other))
        })
    }

    /// The port on `switch` that leads to `neighbor`.
    pub fn port_towards(&self, switch: NodeId, neighbor: NodeId) -> Option<Port> {
        self.links_of(switch)
            .find(|&(_, _, n)| n == neighbor)
            .map(|(port, _, _)| port)
    }

    /// The capacity of the link between `a` and `b`, if they are adjacent.
    pub fn capacity(&self, a: NodeId, b: NodeId) -> Option<Mbps> {
        self.links
            .iter()
            .find(|l| l.connects(a, b))
            .map(Link::capacity_or_unlimited)
    }

    /// The capacity of every link, keyed by canonical pair. Unlimited links get
    /// [`Mbps::UNLIMITED`]; absent pairs read as zero.
    pub fn capacities(&self) -> UsageStore<f64> {
        let mut store = UsageStore::new(0.0);
        for link in &self.links {
            store.set(link.pair(), link.capacity_or_unlimited().into_f64());
        }
        store
    }

    /// The capacity of the links touching `switch`.
    pub fn capacities_at(&self, switch: NodeId) -> UsageStore<f64> {
        let mut store = UsageStore::new(0.0);
        for (_, link, _) in self.links_of(switch) {
            store.set(link.pair(), link.capacity_or_unlimited().into_f64());
        }
        store
    }
}

fn port_of(link_idx: usize) -> Port {
    Port::new(link_idx as u32 + 1)
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("Duplicate node ID {0}")]
    DuplicateNodeId(NodeId),

    #[error("Node {id} is declared in the wrong list (expected a {expected:?})")]
    WrongKind { id: NodeId, expected: NodeKind },

    #[error("Node {0} is connected to itself")]
    NodeAdjacentSelf(NodeId),

    #[error("Node {0} is not declared")]
    UndeclaredNode(NodeId),

    #[error("Duplicate links between {n1} and {n2}")]
    DuplicateLink { n1: NodeId, n2: NodeId },

    #[error("Node {0} is not connected to any other node")]
    IsolatedNode(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn h(n: u32) -> NodeId {
        NodeId::host(n)
    }

    fn s(n: u32) -> NodeId {
        NodeId::switch(n)
    }

    #[test]
    fn empty_topology_succeeds() {
        assert!(
            Topology::new(&[], &[], &[]).is_ok(),
            "failed to create empty topology"
        );
    }

    #[test]
    fn three_node_topology_succeeds() {
        let links = [Link::new(h(1), s(1), None), Link::new(h(2), s(1), None)];
        let res = Topology::new(&[h(1), h(2)], &[s(1)], &links);
        assert!(res.is_ok());
    }

    #[test]
    fn eight_node_topology_succeeds() {
        assert!(testing::eight_node_topology().is_ok());
    }

    #[test]
    fn duplicate_node_fails() {
        let links = [Link::new(h(1), s(1), None)];
        let res = Topology::new(&[h(1), h(1)], &[s(1)], &links);
        assert!(matches!(res, Err(TopologyError::DuplicateNodeId(..))));
    }

    #[test]
    fn wrong_kind_fails() {
        let links = [Link::new(h(1), s(1), None)];
        let res = Topology::new(&[h(1), s(1)], &[], &links);
        assert!(matches!(res, Err(TopologyError::WrongKind { .. })));
    }

    #[test]
    fn node_adjacent_self_fails() {
        let links = [
            Link::new(h(1), s(1), None),
            Link::new(s(1), s(1), None), // error
        ];
        let res = Topology::new(&[h(1)], &[s(1)], &links);
        assert!(matches!(res, Err(TopologyError::NodeAdjacentSelf(..))));
    }

    #[test]
    fn undeclared_node_fails() {
        let links = [Link::new(h(1), s(1), None), Link::new(h(2), s(1), None)];
        let res = Topology::new(&[h(1)], &[s(1)], &links);
        assert!(matches!(res, Err(TopologyError::UndeclaredNode(..))));
    }

    #[test]
    fn duplicate_links_fails() {
        let links = [
            Link::new(h(1), s(1), None),
            Link::new(s(1), h(1), None), // error
        ];
        let res = Topology::new(&[h(1)], &[s(1)], &links);
        assert!(matches!(res, Err(TopologyError::DuplicateLink { .. })));
    }

    #[test]
    fn isolated_node_fails() {
        let links = [Link::new(h(1), s(1), None)];
        let res = Topology::new(&[h(1), h(2)], &[s(1)], &links);
        assert!(matches!(res, Err(TopologyError::IsolatedNode(..))));
    }

    #[test]
    fn ports_follow_link_order() -> anyhow::Result<()> {
        let topo = testing::linear_topology()?;
        // Links: h1-s1, s1-s2, s2-h2
        assert_eq!(topo.port_towards(s(1), h(1)), Some(Port::new(1)));
        assert_eq!(topo.port_towards(s(1), s(2)), Some(Port::new(2)));
        assert_eq!(topo.port_towards(s(2), s(1)), Some(Port::new(2)));
        assert_eq!(topo.port_towards(s(2), h(2)), Some(Port::new(3)));
        assert_eq!(topo.port_towards(s(1), h(2)), None);
        Ok(())
    }

    #[test]
    fn missing_capacity_is_unlimited() -> anyhow::Result<()> {
        let topo = Topology::new(&[h(1)], &[s(1)], &[Link::new(h(1), s(1), None)])?;
        assert_eq!(topo.capacity(s(1), h(1)), Some(Mbps::UNLIMITED));
        assert_eq!(topo.capacities().get((h(1), s(1))), Mbps::UNLIMITED.into_f64());
        Ok(())
    }
}
