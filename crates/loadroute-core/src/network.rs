pub mod paths;
pub mod topology;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use ordered_float::OrderedFloat;

pub use topology::TopologyError;
pub use types::*;

use crate::constants::MIN_CAPACITY;
use crate::evaluate::Prediction;
use crate::route::{Route, RouteTable};
use crate::store::{self, AggregateView, FallbackChain, FlowLinkView, ReadThrough, UsageStore};

use self::topology::Topology;

/// A switch as seen by the simulator: its flow ledger and the capacity of the links it touches.
#[derive(Debug, Clone)]
pub struct SimSwitch {
    name: NodeId,
    ledger: FlowLedger,
    capacity: UsageStore<f64>,
    link_rules: UsageStore<u32>,
}

impl SimSwitch {
    pub fn new(name: NodeId, ledger: FlowLedger, capacity: UsageStore<f64>) -> Self {
        let mut sw = Self {
            name,
            ledger,
            capacity,
            link_rules: UsageStore::new(0),
        };
        sw.recompute();
        sw
    }

    /// Counts, per link, the flow shares with a positive rate.
    fn recompute(&mut self) {
        let mut rules = UsageStore::new(0);
        for (key, &rate) in &self.ledger {
            if rate > 0.0 {
                let n = rules.get(key.link());
                rules.set(key.link(), n + 1);
            }
        }
        self.link_rules = rules;
    }

    pub fn name(&self) -> NodeId {
        self.name
    }

    pub fn ledger(&self) -> &FlowLedger {
        &self.ledger
    }

    pub fn capacity(&self) -> &UsageStore<f64> {
        &self.capacity
    }

    pub fn link_rules(&self) -> &UsageStore<u32> {
        &self.link_rules
    }

    /// The measured rate of every link leaving this switch.
    pub fn link_speed(&self) -> FlowLinkView<'_> {
        FlowLinkView::new(&self.ledger)
    }

    delegate::delegate! {
        to self.ledger {
            #[call(len)]
            pub fn nr_flows(&self) -> usize;
        }
    }
}

/// A copy of the network used to evaluate hypothetical reroutes. Mutating operations return new
/// networks; derived aggregates are recomputed whenever a ledger changes.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    switches: BTreeMap<NodeId, SimSwitch>,
    capacity: Arc<UsageStore<f64>>,
    routes: RouteTable,
    throughput: UsageStore<f64>,
    link_usage: UsageStore<f64>,
    link_flows: UsageStore<u32>,
}

impl SimNetwork {
    /// Creates a network from switch snapshots, the capacity of every topology link and the
    /// current route table.
    pub fn new(
        switches: impl IntoIterator<Item = SimSwitch>,
        capacity: Arc<UsageStore<f64>>,
        routes: RouteTable,
    ) -> Self {
        let mut net = Self {
            switches: switches.into_iter().map(|sw| (sw.name, sw)).collect(),
            capacity,
            routes,
            throughput: UsageStore::new(0.0),
            link_usage: UsageStore::new(0.0),
            link_flows: UsageStore::new(0),
        };
        net.recompute();
        net
    }

    /// Creates a network with one switch per topology switch, taking each switch's ledger from
    /// `ledgers` (empty if absent).
    pub fn from_topology(
        topology: &Topology,
        mut ledgers: BTreeMap<NodeId, FlowLedger>,
        routes: RouteTable,
    ) -> Self {
        let switches = topology.switches().iter().map(|&sw| {
            SimSwitch::new(
                sw,
                ledgers.remove(&sw).unwrap_or_default(),
                topology.capacities_at(sw),
            )
        });
        Self::new(switches.collect::<Vec<_>>(), Arc::new(topology.capacities()), routes)
    }

    fn recompute(&mut self) {
        let view = AggregateView::new(
            self.switches.values().map(SimSwitch::link_speed).collect(),
            store::sum,
        );
        self.throughput = view.snapshot();
        self.link_usage = self
            .capacity
            .calculate(&self.throughput, |&cap, speed| speed / cap.max(MIN_CAPACITY));
        let mut flows = UsageStore::new(0);
        for sw in self.switches.values() {
            for (key, &rate) in &sw.ledger {
                let link = key.link();
                if sw.capacity.get(link) > 0.0 && rate > 0.0 {
                    let n = flows.get(link);
                    flows.set(link, n + 1);
                }
            }
        }
        self.link_flows = flows;
    }

    pub fn switches(&self) -> impl Iterator<Item = &SimSwitch> {
        self.switches.values()
    }

    pub fn switch(&self, name: NodeId) -> Option<&SimSwitch> {
        self.switches.get(&name)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The route recorded for a host pair, or an empty route.
    pub fn route(&self, h1: NodeId, h2: NodeId) -> Route {
        self.routes.get((h1, h2))
    }

    pub fn capacity(&self) -> &UsageStore<f64> {
        &self.capacity
    }

    /// Summed measured rate per link across every switch.
    pub fn throughput(&self) -> &UsageStore<f64> {
        &self.throughput
    }

    /// Throughput over capacity for every topology link.
    pub fn link_usage(&self) -> &UsageStore<f64> {
        &self.link_usage
    }

    /// The number of active flow shares per link.
    pub fn link_flows(&self) -> &UsageStore<u32> {
        &self.link_flows
    }

    /// Every ledger of the network, searched in switch order.
    pub fn flows(&self) -> FallbackChain<'_, FlowKey, f64> {
        FallbackChain::new(self.switches.values().map(|sw| &sw.ledger).collect())
    }

    pub fn flow_rate(&self, key: &FlowKey) -> f64 {
        self.switches
            .get(&key.switch)
            .and_then(|sw| sw.ledger.get(key))
            .copied()
            .unwrap_or(0.0)
    }

    fn link_capacity(&self, a: NodeId, b: NodeId) -> f64 {
        self.capacity.get((a, b)).max(MIN_CAPACITY)
    }

    /// Walks every hop of every alternative of `route`, oriented from the pair's canonical first
    /// host, and returns the largest weighted value of `metric(forward, reverse, capacity)`.
    fn pair_metric(&self, route: &Route, metric: impl Fn(f64, f64, f64) -> f64) -> f64 {
        let Some(pair) = route.pair() else {
            return 0.0;
        };
        let (h1, h2) = pair.into_tuple();
        let mut peak = 0.0_f64;
        for (path, weight) in route.alternatives() {
            let path = oriented(path, h1);
            for hop in path.windows(2) {
                let (a, b) = (hop[0], hop[1]);
                let fwd = self.flow_rate(&FlowKey::new(Some(h1), a, b, h2));
                let rev = self.flow_rate(&FlowKey::new(Some(h2), b, a, h1));
                peak = peak.max(metric(fwd, rev, self.link_capacity(a, b)) * weight);
            }
        }
        peak
    }

    /// The route's bottleneck: the largest share of a link's capacity used by this pair's own
    /// traffic.
    pub fn max_flow_load(&self, route: &Route) -> f64 {
        self.pair_metric(route, |fwd, rev, cap| fwd / cap + rev / cap)
    }

    /// The largest rate this pair's own traffic reaches on any hop of the route.
    pub fn max_flow_speed(&self, route: &Route) -> f64 {
        self.pair_metric(route, |fwd, rev, _| fwd + rev)
    }

    /// The largest network-wide utilization over the route's links.
    pub fn max_path_load(&self, route: &Route) -> f64 {
        route
            .alternatives()
            .into_iter()
            .flat_map(|(path, _)| path.windows(2).map(|hop| self.link_usage.get((hop[0], hop[1]))))
            .fold(0.0, f64::max)
    }

    /// Returns a network in which the pair connected by `route` is forwarded along it.
    ///
    /// The pair's ledger entries are removed from every switch and replaced, at each transit
    /// switch, by a forward and a reverse entry each set to half of the alternative's weighted
    /// share of the pair's previous rate. Alternatives sharing a hop overwrite, not add.
    pub fn with_modified_path(&self, route: &Route) -> SimNetwork {
        let Some(pair) = route.pair() else {
            return self.clone();
        };
        let (h1, h2) = pair.into_tuple();
        let speed = self.max_flow_speed(&self.route(h1, h2));
        let mut next = self.clone();
        for sw in next.switches.values_mut() {
            sw.ledger.retain(|key, _| !key.is_between(h1, h2));
        }
        for (path, weight) in route.alternatives() {
            let path = oriented(path, h1);
            let n = path.len();
            let share = weight * speed / 2.0;
            for i in 1..n.saturating_sub(1) {
                let Some(sw) = next.switches.get_mut(&path[i]) else {
                    continue;
                };
                let fwd = FlowKey::new(Some(path[0]), path[i], path[i + 1], path[n - 1]);
                let rev = FlowKey::new(Some(path[n - 1]), path[i], path[i - 1], path[0]);
                sw.ledger.insert(fwd, share);
                sw.ledger.insert(rev, share);
            }
        }
        for sw in next.switches.values_mut() {
            sw.recompute();
        }
        next.routes.set(pair, route.clone());
        next.recompute();
        next
    }

    /// Re-applies every recorded route, dropping ledger entries no route accounts for.
    pub fn copy_normalized(&self) -> SimNetwork {
        let routes = self
            .routes
            .iter()
            .filter(|(_, route)| !route.is_empty())
            .map(|(pair, route)| (pair, route.clone()))
            .collect::<Vec<_>>();
        let mut net = self.clone();
        for (_, route) in &routes {
            net = net.with_modified_path(route);
        }
        let routed = |key: &FlowKey| {
            key.src.map_or(false, |src| {
                src != key.dst && routes.iter().any(|(pair, _)| key.is_between(pair.a(), pair.b()))
            })
        };
        for sw in net.switches.values_mut() {
            sw.ledger.retain(|key, _| routed(key));
            sw.recompute();
        }
        net.recompute();
        net
    }

    /// Replaces every measured rate by a hedged prediction: the measurement scaled by `hedge`,
    /// unless the previous prediction decayed by `decay` is larger.
    pub fn copy_scaling(
        &self,
        prev: Option<&Prediction>,
        hedge: f64,
        decay: f64,
    ) -> (SimNetwork, Prediction) {
        let mut next = self.clone();
        let mut prediction = Prediction::default();
        for sw in next.switches.values_mut() {
            for (key, rate) in sw.ledger.iter_mut() {
                let scaled = *rate * hedge;
                let decayed = prev.and_then(|p| p.get(key)).copied().unwrap_or(0.0) * decay;
                *rate = scaled.max(decayed);
                prediction.insert(*key, *rate);
            }
            sw.recompute();
        }
        next.recompute();
        (next, prediction)
    }

    /// Orders routes by descending bottleneck load, shorter routes first among equals.
    pub fn sort_by_max_flow_load(&self, routes: Vec<Route>) -> Vec<Route> {
        let mut keyed = routes
            .into_iter()
            .map(|route| {
                let load = OrderedFloat(self.max_flow_load(&route));
                (load, route.shortest_len(), route)
            })
            .collect::<Vec<_>>();
        keyed.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| first_path(&a.2).cmp(&first_path(&b.2)))
        });
        keyed.into_iter().map(|(_, _, route)| route).collect()
    }
}

fn oriented(path: &[NodeId], from: NodeId) -> Vec<NodeId> {
    if path.first() == Some(&from) {
        path.to_vec()
    } else {
        path.iter().rev().copied().collect()
    }
}

fn first_path(route: &Route) -> Vec<NodeId> {
    route
        .alternatives()
        .first()
        .map(|(p, _)| p.to_vec())
        .unwrap_or_default()
}
