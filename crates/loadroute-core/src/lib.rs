#![warn(unreachable_pub, missing_debug_implementations)]

//! The core load-balancing routing library. This crate defines the
//! [simulated network](network::SimNetwork) that path evaluators reroute, the
//! [usage stores](store) it aggregates link measurements with, and the
//! [graph utilities](network::paths) that enumerate alternate paths between hosts.

#[macro_use]
mod ident;

pub mod addr;
pub mod config;
pub mod constants;
pub mod evaluate;
pub mod network;
pub mod route;
pub mod store;
pub mod units;

pub(crate) mod utils;

#[doc(hidden)]
pub mod testing;

pub use config::{Config, ConfigError, Policy};
pub use evaluate::{EvaluateError, Evaluation, NullEvaluator, PathEvaluator, Prediction};
pub use network::{
    paths::{AlternatePaths, AlternatesError, Path, PathCache, ShortestPaths},
    topology::{Topology, TopologyError},
    types::{FlowKey, FlowLedger, Link, NodeId, NodeKind, NodePair},
    SimNetwork, SimSwitch,
};
pub use route::{Route, RouteError, RouteTable, Transitions, WeightedPaths};
pub use ident::{Dpid, GroupId, Port};
pub use store::{ReadThrough, UsageStore};
pub use units::{Bytes, Mbps};
