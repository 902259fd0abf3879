//! Greedy single-path rerouting that minimizes each pair's bottleneck.

use std::sync::Arc;

use loadroute_core::{
    EvaluateError, Evaluation, PathCache, PathEvaluator, Prediction, Route, SimNetwork,
};
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::scoring::{self, Shuffler};

/// Visits host pairs in random order and commits, for each, the candidate path whose most
/// utilized link is least utilized once the pair is moved onto it. Shorter paths win ties. There
/// is no backtracking.
#[derive(Debug, derive_new::new)]
pub struct MinMaxEvaluator {
    cache: Arc<PathCache>,
    shuffler: Shuffler,
}

impl PathEvaluator for MinMaxEvaluator {
    fn evaluate(
        &self,
        network: &SimNetwork,
        _carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError> {
        let mut rng = self.shuffler.rng();
        let mut net = network.copy_normalized();
        for pair in scoring::shuffled_pairs(self.cache.hosts(), &mut rng) {
            let (h1, h2) = pair.into_tuple();
            let candidates = self.cache.alternates_between(h1, h2);
            let best = candidates
                .par_iter()
                .map(|path| {
                    let route = Route::SinglePath(path.clone());
                    let moved = net.with_modified_path(&route);
                    let load = OrderedFloat(moved.max_path_load(&route));
                    (load, path.len(), path, moved)
                })
                .min_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
            if let Some((_, _, _, moved)) = best {
                net = moved;
            }
        }
        Ok(Evaluation::new(net.routes().clone(), None))
    }
}
