//! Core data structures and traits. Most uses start from a [`Topology`], build a [`PathCache`]
//! from it and hand [`SimNetwork`] snapshots to a [`PathEvaluator`](evaluate::PathEvaluator).

pub use loadroute_core::*;
