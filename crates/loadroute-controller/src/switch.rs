//! The controller of one connected switch.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use log::{debug, info};
use loadroute_core::addr::{self, AddrError};
use loadroute_core::constants::{PRIORITY_DYNAMIC, PRIORITY_ECMP, PRIORITY_FALLBACK};
use loadroute_core::network::paths::loop_free_alternatives;
use loadroute_core::{
    Bytes, Dpid, FlowKey, FlowLedger, Mbps, NodeId, PathCache, Port, Route, SimSwitch, Topology,
    UsageStore,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::groups::{bucket_weight, GroupTable};
use crate::southbound::{
    Action, Bucket, Datapath, FlowMod, FlowStat, GroupMod, Match, SouthboundError,
};

/// Owns the connection to one switch, the rules installed on it and its measured flow rates.
#[derive(Debug)]
pub struct SwitchController {
    name: NodeId,
    datapath: Box<dyn Datapath>,
    ports: FxHashMap<NodeId, Port>,
    peers: FxHashMap<Port, NodeId>,
    capacity: UsageStore<f64>,
    byte_counts: FxHashMap<FlowKey, Bytes>,
    ledger: FlowLedger,
}

impl SwitchController {
    /// Binds a datapath to the topology switch `s<dpid>`.
    pub fn new(datapath: Box<dyn Datapath>, topology: &Topology) -> Result<Self, SwitchError> {
        let dpid = datapath.id();
        let name = u32::try_from(dpid.inner())
            .map(NodeId::switch)
            .map_err(|_| SwitchError::UnknownSwitch(dpid))?;
        if !topology.contains(name) {
            return Err(SwitchError::UnknownSwitch(dpid));
        }
        let mut ports = FxHashMap::default();
        let mut peers = FxHashMap::default();
        for (port, _, neighbor) in topology.links_of(name) {
            ports.insert(neighbor, port);
            peers.insert(port, neighbor);
        }
        Ok(Self {
            name,
            datapath,
            ports,
            peers,
            capacity: topology.capacities_at(name),
            byte_counts: FxHashMap::default(),
            ledger: FlowLedger::default(),
        })
    }

    pub fn name(&self) -> NodeId {
        self.name
    }

    pub fn dpid(&self) -> Dpid {
        self.datapath.id()
    }

    pub fn ledger(&self) -> &FlowLedger {
        &self.ledger
    }

    fn port(&self, neighbor: NodeId) -> Result<Port, SwitchError> {
        self.ports
            .get(&neighbor)
            .copied()
            .ok_or(SwitchError::NoPort {
                switch: self.name,
                neighbor,
            })
    }

    /// Installs one IPv4 and one ARP fallback rule per host, towards the first hop of the
    /// shortest path to it. Hosts that cannot be reached get no rule.
    pub fn install_fallback(&mut self, cache: &PathCache) -> Result<(), SwitchError> {
        for &host in cache.hosts() {
            let Some(next) = cache.next_hop(self.name, host) else {
                debug!("{} has no path to {host}", self.name);
                continue;
            };
            let port = self.port(next)?;
            let ip = addr::host_ip(host)?;
            debug!("{} --[{port}]--> {next} ({ip})", self.name);
            self.datapath.send_flow_mod(FlowMod::new(
                PRIORITY_FALLBACK,
                Match::ipv4(None, ip),
                Action::Output(port),
            ))?;
            self.datapath.send_flow_mod(FlowMod::new(
                PRIORITY_FALLBACK,
                Match::arp(ip),
                Action::Output(port),
            ))?;
        }
        info!("Fallback rules installed on {}", self.name);
        Ok(())
    }

    /// Pre-installs, for every ordered host pair, the next hops of the loop-free alternates
    /// through this switch. Several next hops share traffic through a select group weighted by
    /// link capacity.
    pub fn install_ecmp(
        &mut self,
        cache: &PathCache,
        groups: &mut GroupTable,
    ) -> Result<(), SwitchError> {
        let hosts = cache.hosts();
        for &h1 in hosts {
            for &h2 in hosts {
                if h1 == h2 {
                    continue;
                }
                let candidates = cache.alternates_between(h1, h2);
                let next_hops = loop_free_alternatives(h1, h2, candidates, Some(self.name))
                    .iter()
                    .filter_map(|path| {
                        let at = path.iter().position(|&n| n == self.name)?;
                        path.get(at + 1).copied()
                    })
                    .collect::<BTreeSet<_>>();
                let weights = next_hops
                    .iter()
                    .map(|&next| (next, self.capacity.get((self.name, next))))
                    .collect::<Vec<_>>();
                let total = weights.iter().map(|&(_, cap)| cap).sum::<f64>();
                let weights = weights
                    .into_iter()
                    .map(|(next, cap)| (next, if total > 0.0 { cap / total } else { 0.0 }))
                    .collect::<BTreeMap<_, _>>();
                self.install_split(h1, h2, &weights, PRIORITY_ECMP, groups)?;
            }
        }
        info!("ECMP groups installed on {}", self.name);
        Ok(())
    }

    /// Forwards `src -> dst` traffic to `next` at the dynamic priority.
    pub fn add_segment(&mut self, src: NodeId, dst: NodeId, next: NodeId) -> Result<(), SwitchError> {
        let port = self.port(next)?;
        let matches = Match::ipv4(Some(addr::host_ip(src)?), addr::host_ip(dst)?);
        debug!("{} ({src} -> {dst}) --[{port}]--> {next}", self.name);
        self.datapath
            .send_flow_mod(FlowMod::new(PRIORITY_DYNAMIC, matches, Action::Output(port)))?;
        Ok(())
    }

    /// Splits `src -> dst` traffic over `next_hops` at the dynamic priority.
    pub fn add_weighted(
        &mut self,
        src: NodeId,
        dst: NodeId,
        next_hops: &BTreeMap<NodeId, f64>,
        groups: &mut GroupTable,
    ) -> Result<(), SwitchError> {
        self.install_split(src, dst, next_hops, PRIORITY_DYNAMIC, groups)
    }

    fn install_split(
        &mut self,
        src: NodeId,
        dst: NodeId,
        next_hops: &BTreeMap<NodeId, f64>,
        priority: u16,
        groups: &mut GroupTable,
    ) -> Result<(), SwitchError> {
        let matches = Match::ipv4(Some(addr::host_ip(src)?), addr::host_ip(dst)?);
        let mut hops = next_hops.keys();
        let action = match (hops.next(), hops.next()) {
            (None, _) => return Ok(()),
            (Some(&next), None) => Action::Output(self.port(next)?),
            _ => {
                let buckets = next_hops
                    .iter()
                    .map(|(&next, &share)| Ok(Bucket::new(bucket_weight(share), self.port(next)?)))
                    .collect::<Result<Vec<_>, SwitchError>>()?;
                let (group, command) = groups.allocate(src, self.name, dst);
                groups.set_buckets(group, buckets.clone());
                debug!("{} ({src} -> {dst}) group {group}: {buckets:?}", self.name);
                self.datapath
                    .send_group_mod(GroupMod::new(command, group, buckets))?;
                Action::Group(group)
            }
        };
        self.datapath
            .send_flow_mod(FlowMod::new(priority, matches, action))?;
        Ok(())
    }

    /// Installs the parts of `route` that concern this switch, in both directions.
    pub fn install_route(
        &mut self,
        route: &Route,
        groups: &mut GroupTable,
    ) -> Result<(), SwitchError> {
        let Some(pair) = route.pair() else {
            return Ok(());
        };
        let (h1, h2) = pair.into_tuple();
        match route {
            Route::SinglePath(path) => {
                let forward = path.first() == Some(&h1);
                for hop in path.windows(2) {
                    let (a, b) = if forward { (hop[0], hop[1]) } else { (hop[1], hop[0]) };
                    if a == self.name {
                        self.add_segment(h1, h2, b)?;
                    }
                    if b == self.name {
                        self.add_segment(h2, h1, a)?;
                    }
                }
            }
            Route::WeightedPaths(_) => {
                for (src, dst) in [(h1, h2), (h2, h1)] {
                    if let Some(next_hops) = route.transitions(src).get(&self.name) {
                        self.add_weighted(src, dst, next_hops, groups)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn request_stats(&mut self) -> Result<(), SouthboundError> {
        self.datapath.request_flow_stats()
    }

    /// Folds one stats reply into the ledger.
    ///
    /// Every IPv4 rule's byte delta since the previous reply becomes a rate over `interval`.
    /// Group actions are split by bucket weight. Ledger entries no rule reported are zeroed.
    pub fn on_stats(&mut self, stats: &[FlowStat], groups: &GroupTable, interval: Duration) {
        let mut seen = FxHashSet::default();
        for stat in stats {
            if !stat.matches.is_ipv4() {
                continue;
            }
            let Some(dst) = stat.matches.ipv4_dst.and_then(addr::ip_host) else {
                continue;
            };
            let src = stat.matches.ipv4_src.and_then(addr::ip_host);
            let outs = match stat.action {
                Action::Output(port) => vec![(port, 1.0)],
                Action::Group(group) => groups.shares(group),
            };
            for (port, share) in outs {
                let Some(&next) = self.peers.get(&port) else {
                    continue;
                };
                let key = FlowKey::new(src, self.name, next, dst);
                let previous = self.byte_counts.insert(key, stat.byte_count);
                let delta = stat
                    .byte_count
                    .saturating_delta(previous.unwrap_or(Bytes::ZERO));
                let rate = Mbps::from_bytes(delta.into_f64() * share, interval);
                self.ledger.insert(key, rate.into_f64());
                seen.insert(key);
            }
        }
        for (key, rate) in self.ledger.iter_mut() {
            if !seen.contains(key) {
                *rate = 0.0;
            }
        }
    }

    /// An independent copy of the measured state.
    pub fn snapshot(&self) -> SimSwitch {
        SimSwitch::new(self.name, self.ledger.clone(), self.capacity.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("datapath {0} is not a switch of the topology")]
    UnknownSwitch(Dpid),

    #[error("{switch} has no port towards {neighbor}")]
    NoPort { switch: NodeId, neighbor: NodeId },

    #[error("southbound error")]
    Southbound(#[from] SouthboundError),

    #[error("address error")]
    Addr(#[from] AddrError),
}
