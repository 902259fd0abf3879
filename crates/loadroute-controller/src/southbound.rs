//! The messages exchanged with switches and the [`Datapath`] a transport implements.
//!
//! Only what the controller uses is modeled: exact-match rules with a single action, select
//! groups and per-rule byte counters.

use std::fmt;
use std::net::Ipv4Addr;

use loadroute_core::constants::{ETH_TYPE_ARP, ETH_TYPE_IPV4};
use loadroute_core::{Bytes, Dpid, GroupId, Port};

/// Match fields of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Match {
    pub eth_type: u16,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
    pub arp_tpa: Option<Ipv4Addr>,
}

impl Match {
    /// IPv4 traffic to `dst`, optionally only from `src`.
    pub fn ipv4(src: Option<Ipv4Addr>, dst: Ipv4Addr) -> Self {
        Self {
            eth_type: ETH_TYPE_IPV4,
            ipv4_src: src,
            ipv4_dst: Some(dst),
            arp_tpa: None,
        }
    }

    /// ARP requests for `tpa`.
    pub fn arp(tpa: Ipv4Addr) -> Self {
        Self {
            eth_type: ETH_TYPE_ARP,
            ipv4_src: None,
            ipv4_dst: None,
            arp_tpa: Some(tpa),
        }
    }

    pub fn is_ipv4(&self) -> bool {
        self.eth_type == ETH_TYPE_IPV4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Output(Port),
    Group(GroupId),
}

/// Adds a rule, replacing any rule with the same priority and match.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct FlowMod {
    pub priority: u16,
    pub matches: Match,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCommand {
    Add,
    Modify,
}

/// One output of a select group. Traffic is spread in proportion to the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_new::new)]
pub struct Bucket {
    pub weight: u16,
    pub port: Port,
}

/// Creates or replaces a select group.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct GroupMod {
    pub command: GroupCommand,
    pub group: GroupId,
    pub buckets: Vec<Bucket>,
}

/// The counters of one installed rule.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct FlowStat {
    pub priority: u16,
    pub matches: Match,
    pub action: Action,
    pub byte_count: Bytes,
}

/// A connection to one switch.
///
/// Sends never block on the switch. Stats requested with
/// [`request_flow_stats`](Datapath::request_flow_stats) come back later as an
/// [`Event::StatsReply`].
pub trait Datapath: Send + fmt::Debug {
    fn id(&self) -> Dpid;

    fn send_flow_mod(&mut self, flow: FlowMod) -> Result<(), SouthboundError>;

    fn send_group_mod(&mut self, group: GroupMod) -> Result<(), SouthboundError>;

    fn request_flow_stats(&mut self) -> Result<(), SouthboundError>;
}

impl<T: Datapath + ?Sized> Datapath for Box<T> {
    fn id(&self) -> Dpid {
        (**self).id()
    }

    fn send_flow_mod(&mut self, flow: FlowMod) -> Result<(), SouthboundError> {
        (**self).send_flow_mod(flow)
    }

    fn send_group_mod(&mut self, group: GroupMod) -> Result<(), SouthboundError> {
        (**self).send_group_mod(group)
    }

    fn request_flow_stats(&mut self) -> Result<(), SouthboundError> {
        (**self).request_flow_stats()
    }
}

/// What the transport reports to the controller.
#[derive(Debug)]
pub enum Event {
    Connected(Box<dyn Datapath>),
    Disconnected(Dpid),
    StatsReply { dpid: Dpid, stats: Vec<FlowStat> },
}

#[derive(Debug, thiserror::Error)]
pub enum SouthboundError {
    #[error("datapath {0} is disconnected")]
    Disconnected(Dpid),

    #[error("failed to reach datapath {dpid}: {reason}")]
    Transport { dpid: Dpid, reason: String },
}
