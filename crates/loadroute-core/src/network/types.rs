use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;

use crate::units::Mbps;

/// Measured or predicted rates, in Mbps, of the traffic shares seen at a switch.
pub type FlowLedger = FxHashMap<FlowKey, f64>;

/// The kind of a node, encoded as the prefix of its name (`h` or `s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Host,
    Switch,
}

impl NodeKind {
    fn prefix(self) -> char {
        match self {
            NodeKind::Host => 'h',
            NodeKind::Switch => 's',
        }
    }
}

/// A node name such as `h3` or `s12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    kind: NodeKind,
    num: u32,
}

impl NodeId {
    pub const fn new(kind: NodeKind, num: u32) -> Self {
        Self { kind, num }
    }

    pub const fn host(num: u32) -> Self {
        Self::new(NodeKind::Host, num)
    }

    pub const fn switch(num: u32) -> Self {
        Self::new(NodeKind::Switch, num)
    }

    pub const fn kind(self) -> NodeKind {
        self.kind
    }

    pub const fn num(self) -> u32 {
        self.num
    }

    pub fn is_host(self) -> bool {
        matches!(self.kind, NodeKind::Host)
    }

    pub fn is_switch(self) -> bool {
        matches!(self.kind, NodeKind::Switch)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.num)
    }
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let kind = match chars.next() {
            Some('h') => NodeKind::Host,
            Some('s') => NodeKind::Switch,
            _ => return Err(ParseNodeIdError(s.to_owned())),
        };
        let num = chars
            .as_str()
            .parse()
            .map_err(|_| ParseNodeIdError(s.to_owned()))?;
        Ok(Self { kind, num })
    }
}

impl TryFrom<String> for NodeId {
    type Error = ParseNodeIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid node name {0:?} (expected `h<N>` or `s<N>`)")]
pub struct ParseNodeIdError(String);

/// An unordered pair of nodes in canonical order, used as the key of every link- or
/// host-pair-keyed map.
///
/// If exactly one endpoint is a host, the switch comes first. Otherwise the endpoint with the
/// smaller numeric suffix comes first. `NodePair::new(a, b) == NodePair::new(b, a)` always
/// holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePair(NodeId, NodeId);

impl NodePair {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        let swap = match (a.kind, b.kind) {
            (NodeKind::Host, NodeKind::Switch) => true,
            (NodeKind::Switch, NodeKind::Host) => false,
            _ => a.num > b.num,
        };
        if swap {
            Self(b, a)
        } else {
            Self(a, b)
        }
    }

    pub fn a(&self) -> NodeId {
        self.0
    }

    pub fn b(&self) -> NodeId {
        self.1
    }

    pub fn into_tuple(self) -> (NodeId, NodeId) {
        (self.0, self.1)
    }

    /// Returns the endpoint opposite `node`, if `node` is an endpoint.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.0 == node {
            Some(self.1)
        } else if self.1 == node {
            Some(self.0)
        } else {
            None
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0 == node || self.1 == node
    }
}

impl From<(NodeId, NodeId)> for NodePair {
    fn from((a, b): (NodeId, NodeId)) -> Self {
        Self::new(a, b)
    }
}

impl fmt::Display for NodePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

/// A bidirectional link. A missing capacity means the link is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Link {
    pub a: NodeId,
    pub b: NodeId,
    pub capacity: Option<Mbps>,
}

impl Link {
    pub fn new(a: NodeId, b: NodeId, capacity: Option<Mbps>) -> Self {
        Self { a, b, capacity }
    }

    pub fn connects(&self, x: NodeId, y: NodeId) -> bool {
        self.a == x && self.b == y || self.a == y && self.b == x
    }

    pub fn pair(&self) -> NodePair {
        NodePair::new(self.a, self.b)
    }

    pub fn capacity_or_unlimited(&self) -> Mbps {
        self.capacity.unwrap_or(Mbps::UNLIMITED)
    }
}

/// A measured unidirectional traffic share on one hop: traffic from `src` to `dst` leaving
/// `switch` towards `next`. `src` is `None` for traffic matched only by destination (the
/// static fallback rules).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey {
    pub src: Option<NodeId>,
    pub switch: NodeId,
    pub next: NodeId,
    pub dst: NodeId,
}

impl FlowKey {
    pub fn new(src: Option<NodeId>, switch: NodeId, next: NodeId, dst: NodeId) -> Self {
        Self {
            src,
            switch,
            next,
            dst,
        }
    }

    /// The link this share travels over.
    pub fn link(&self) -> NodePair {
        NodePair::new(self.switch, self.next)
    }

    /// Returns true if this share belongs to traffic between `h1` and `h2`, in either direction.
    pub fn is_between(&self, h1: NodeId, h2: NodeId) -> bool {
        let ends = [h1, h2];
        self.src.map_or(false, |src| ends.contains(&src)) && ends.contains(&self.dst)
    }
}
