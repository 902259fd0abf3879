//! Topologies and loaded networks shared by tests across the workspace.

use std::collections::BTreeMap;

use crate::network::topology::{Topology, TopologyError};
use crate::network::types::{FlowKey, FlowLedger, Link, NodeId};
use crate::network::SimNetwork;
use crate::route::{Route, RouteTable};
use crate::units::Mbps;

fn h(n: u32) -> NodeId {
    NodeId::host(n)
}

fn s(n: u32) -> NodeId {
    NodeId::switch(n)
}

fn link(a: NodeId, b: NodeId) -> Link {
    Link::new(a, b, Some(Mbps::new(100.0)))
}

/// `h1 - s1 - s2 - h2`, every link at 100 Mbps.
pub fn linear_topology() -> Result<Topology, TopologyError> {
    Topology::new(
        &[h(1), h(2)],
        &[s(1), s(2)],
        &[link(h(1), s(1)), link(s(1), s(2)), link(s(2), h(2))],
    )
}

/// A ring of four switches `s1 - s2 - s3 - s4 - s1`, with `h1` on `s1` and `h2` on `s3`.
pub fn square_topology() -> Result<Topology, TopologyError> {
    Topology::new(
        &[h(1), h(2)],
        &[s(1), s(2), s(3), s(4)],
        &[
            link(h(1), s(1)),
            link(h(2), s(3)),
            link(s(1), s(2)),
            link(s(2), s(3)),
            link(s(3), s(4)),
            link(s(4), s(1)),
        ],
    )
}

/// Three switches in a triangle. `h1` and `h2` hang off `s1`, `h3` and `h4` off `s2`, so
/// traffic between the two sides can go direct or through `s3`.
pub fn triangle_topology() -> Result<Topology, TopologyError> {
    Topology::new(
        &[h(1), h(2), h(3), h(4)],
        &[s(1), s(2), s(3)],
        &[
            link(h(1), s(1)),
            link(h(2), s(1)),
            link(h(3), s(2)),
            link(h(4), s(2)),
            link(s(1), s(2)),
            link(s(1), s(3)),
            link(s(2), s(3)),
        ],
    )
}

/// Four hosts under two ToRs, each ToR connected to both aggregation switches.
pub fn eight_node_topology() -> Result<Topology, TopologyError> {
    Topology::new(
        &[h(1), h(2), h(3), h(4)],
        &[s(1), s(2), s(3), s(4)],
        &[
            link(h(1), s(1)),
            link(h(2), s(1)),
            link(h(3), s(2)),
            link(h(4), s(2)),
            link(s(1), s(3)),
            link(s(1), s(4)),
            link(s(2), s(3)),
            link(s(2), s(4)),
        ],
    )
}

/// Adds the ledger entries of a pair sending `rate` each way along `path`.
pub fn add_pair_traffic(ledgers: &mut BTreeMap<NodeId, FlowLedger>, path: &[NodeId], rate: f64) {
    let n = path.len();
    for i in 1..n.saturating_sub(1) {
        let fwd = FlowKey::new(Some(path[0]), path[i], path[i + 1], path[n - 1]);
        let rev = FlowKey::new(Some(path[n - 1]), path[i], path[i - 1], path[0]);
        let ledger = ledgers.entry(path[i]).or_default();
        *ledger.entry(fwd).or_default() += rate;
        *ledger.entry(rev).or_default() += rate;
    }
}

/// The linear topology with `h1` and `h2` exchanging `rate` Mbps each way.
pub fn loaded_linear_network(rate: f64) -> Result<SimNetwork, TopologyError> {
    let topo = linear_topology()?;
    let path = vec![h(1), s(1), s(2), h(2)];
    let mut ledgers = BTreeMap::new();
    add_pair_traffic(&mut ledgers, &path, rate);
    let mut routes = RouteTable::default();
    routes.set((h(1), h(2)), Route::SinglePath(path));
    Ok(SimNetwork::from_topology(&topo, ledgers, routes))
}

/// The triangle topology with the pairs `h1-h3` and `h2-h4` both on the direct `s1 - s2` link,
/// each exchanging `rate` Mbps each way.
pub fn loaded_triangle_network(topo: &Topology, rate: f64) -> Result<SimNetwork, TopologyError> {
    let mut ledgers = BTreeMap::new();
    let mut routes = RouteTable::default();
    for path in [
        vec![h(1), s(1), s(2), h(3)],
        vec![h(2), s(1), s(2), h(4)],
    ] {
        add_pair_traffic(&mut ledgers, &path, rate);
        routes.set((path[0], path[3]), Route::SinglePath(path));
    }
    Ok(SimNetwork::from_topology(topo, ledgers, routes))
}
