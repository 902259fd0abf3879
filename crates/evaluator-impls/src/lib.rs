//! This crate contains the routing policies that reroute host pairs at runtime.

#![warn(unreachable_pub, missing_debug_implementations)]

pub mod ldr;
pub mod ldr_single;
pub mod minmax;
mod scoring;

use std::sync::Arc;

use loadroute_core::{Config, NullEvaluator, PathCache, PathEvaluator, Policy};

pub use ldr::LdrEvaluator;
pub use ldr_single::LdrSingleEvaluator;
pub use minmax::MinMaxEvaluator;
pub use scoring::Shuffler;

/// Builds the evaluator a policy runs every monitoring cycle. The static policies get a
/// [`NullEvaluator`].
pub fn for_policy(
    policy: Policy,
    cache: Arc<PathCache>,
    config: &Config,
    seed: Option<u64>,
) -> Box<dyn PathEvaluator> {
    let shuffler = Shuffler::new(seed);
    match policy {
        Policy::Ospf | Policy::Ecmp => Box::new(NullEvaluator),
        Policy::LdrSingle => Box::new(LdrSingleEvaluator::new(cache, config.cost, shuffler)),
        Policy::MinMaxSingle => Box::new(MinMaxEvaluator::new(cache, shuffler)),
        Policy::Ldr => Box::new(LdrEvaluator::new(
            cache,
            config.cost,
            config.apa,
            config.prediction,
            shuffler,
        )),
    }
}
