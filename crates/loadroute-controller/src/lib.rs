//! The controller: programs switches, measures them every monitoring interval and applies the
//! routes the active policy computes.

#![warn(unreachable_pub, missing_debug_implementations)]

pub mod app;
pub mod dry_run;
pub mod groups;
pub mod marker;
pub mod southbound;
pub mod switch;
pub mod worker;

pub use app::App;
pub use dry_run::{DryRunDatapath, DryRunLog};
pub use groups::GroupTable;
pub use marker::ReadinessMarker;
pub use southbound::{
    Action, Bucket, Datapath, Event, FlowMod, FlowStat, GroupCommand, GroupMod, Match,
    SouthboundError,
};
pub use switch::{SwitchController, SwitchError};
pub use worker::{EvalWorker, Job, Outcome};
