use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::Sender;
use loadroute_core::{Bytes, Dpid};

use crate::southbound::{Datapath, Event, FlowMod, FlowStat, GroupMod, SouthboundError};

/// A datapath that programs nothing. It records what it is sent and answers stats requests with
/// zero counters for the IPv4 rules it holds.
#[derive(Debug)]
pub struct DryRunDatapath {
    dpid: Dpid,
    events: Sender<Event>,
    log: Arc<Mutex<DryRunLog>>,
}

/// Everything sent to a [`DryRunDatapath`].
#[derive(Debug, Default, Clone)]
pub struct DryRunLog {
    pub flows: Vec<FlowMod>,
    pub groups: Vec<GroupMod>,
    pub stats_requests: usize,
}

impl DryRunLog {
    /// The rule table as a switch would hold it: the latest rule per priority and match, in
    /// order of first installation.
    pub fn rules(&self) -> Vec<FlowMod> {
        let mut rules: Vec<FlowMod> = Vec::new();
        for flow in &self.flows {
            match rules
                .iter_mut()
                .find(|r| r.priority == flow.priority && r.matches == flow.matches)
            {
                Some(rule) => *rule = flow.clone(),
                None => rules.push(flow.clone()),
            }
        }
        rules
    }
}

impl DryRunDatapath {
    /// Stats replies are delivered on `events`.
    pub fn new(dpid: Dpid, events: Sender<Event>) -> Self {
        Self {
            dpid,
            events,
            log: Arc::default(),
        }
    }

    /// A handle on the record, which stays readable after the datapath moves into the
    /// controller.
    pub fn log(&self) -> Arc<Mutex<DryRunLog>> {
        Arc::clone(&self.log)
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut DryRunLog) -> T) -> T {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut log)
    }
}

impl Datapath for DryRunDatapath {
    fn id(&self) -> Dpid {
        self.dpid
    }

    fn send_flow_mod(&mut self, flow: FlowMod) -> Result<(), SouthboundError> {
        self.with_log(|log| log.flows.push(flow));
        Ok(())
    }

    fn send_group_mod(&mut self, group: GroupMod) -> Result<(), SouthboundError> {
        self.with_log(|log| log.groups.push(group));
        Ok(())
    }

    fn request_flow_stats(&mut self) -> Result<(), SouthboundError> {
        let stats = self.with_log(|log| {
            log.stats_requests += 1;
            log.rules()
                .into_iter()
                .filter(|r| r.matches.is_ipv4())
                .map(|r| FlowStat::new(r.priority, r.matches, r.action, Bytes::ZERO))
                .collect::<Vec<_>>()
        });
        self.events
            .send(Event::StatsReply {
                dpid: self.dpid,
                stats,
            })
            .map_err(|_| SouthboundError::Disconnected(self.dpid))
    }
}
