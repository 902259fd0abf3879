//! `loadroute` is a traffic-engineering controller for software-defined networks. It measures
//! per-flow rates on every switch, evaluates alternate paths between host pairs against a
//! simulated copy of the network, and installs the routes the active policy prefers.

#![warn(unreachable_pub, missing_docs)]

pub mod core;

/// Routing policies that reroute host pairs at runtime.
pub mod impls {
    pub use evaluator_impls::*;
}

/// Input files and the state files read by external tooling.
pub mod utils {
    pub use loadroute_utils::*;
}

/// The switch-facing controller.
pub mod controller {
    pub use loadroute_controller::*;
}
