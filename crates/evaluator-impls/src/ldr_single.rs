//! Greedy single-path rerouting by load and distance.

use std::sync::Arc;

use log::debug;
use loadroute_core::{
    config::CostWeights, EvaluateError, Evaluation, NodePair, Path, PathCache, PathEvaluator,
    Prediction, Route, RouteTable, SimNetwork, UsageStore,
};
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rustc_hash::FxHashSet;

use crate::scoring::{self, Shuffler};

/// Moves one host pair at a time onto the path with the best load-distance score.
///
/// Each round scores every pair's candidates, picks the most loaded pair not yet considered and
/// moves it, keeping the move only if the pair's path does not end up more utilized than before.
/// Every pair is considered exactly once.
#[derive(Debug, derive_new::new)]
pub struct LdrSingleEvaluator {
    cache: Arc<PathCache>,
    cost: CostWeights,
    shuffler: Shuffler,
}

impl LdrSingleEvaluator {
    /// Proposes one path per host pair. Pairs are visited in random order; a pair's choice
    /// reserves its links, making them less attractive to pairs visited later.
    pub(crate) fn propose(&self, net: &SimNetwork) -> RouteTable {
        let mut rng = self.shuffler.rng();
        let usage = net.link_usage();
        let flows = net.link_flows();
        let mut proposals = RouteTable::default();
        let mut reserved: UsageStore<u32> = UsageStore::new(0);
        for pair in scoring::shuffled_pairs(self.cache.hosts(), &mut rng) {
            let (h1, h2) = pair.into_tuple();
            let Some(shortest) = self.cache.shortest_path(h1, h2) else {
                continue;
            };
            let shortest_delay = scoring::path_delay(&shortest, usage, self.cost.hop_delay);
            let mut candidates = self.cache.alternates_between(h1, h2).iter().collect::<Vec<_>>();
            candidates.shuffle(&mut rng);
            let best = candidates
                .into_iter()
                .map(|path| {
                    let score = self.score(path, usage, flows, &reserved, shortest_delay);
                    (OrderedFloat(score), path.len(), path)
                })
                .min_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
            let Some((_, _, best)) = best else {
                continue;
            };
            for link in scoring::links(best) {
                let n = reserved.get(link);
                reserved.set(link, n + 1);
            }
            proposals.set(pair, Route::SinglePath(best.clone()));
        }
        proposals
    }

    fn score(
        &self,
        path: &Path,
        usage: &UsageStore<f64>,
        flows: &UsageStore<u32>,
        reserved: &UsageStore<u32>,
        shortest_delay: f64,
    ) -> f64 {
        let CostWeights { m1, m2, hop_delay } = self.cost;
        let active = scoring::links(path)
            .into_iter()
            .map(|link| f64::from(flows.get(link) + reserved.get(link)))
            .sum::<f64>();
        let delay = scoring::relative_delay(path, usage, hop_delay, m1, shortest_delay);
        let peak = scoring::peak_usage(path, usage);
        let total = scoring::total_usage(path, usage);
        (1.0 + active) * (delay + m2 * peak + total)
    }
}

impl PathEvaluator for LdrSingleEvaluator {
    fn evaluate(
        &self,
        network: &SimNetwork,
        _carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError> {
        let mut net = network.copy_normalized();
        let target = self.propose(&net).len();
        let mut considered = FxHashSet::<NodePair>::default();
        while considered.len() < target {
            let proposals = self.propose(&net).iter().map(|(_, r)| r.clone()).collect();
            let next = net
                .sort_by_max_flow_load(proposals)
                .into_iter()
                .find_map(|route| {
                    let pair = route.pair()?;
                    (!considered.contains(&pair)).then_some((pair, route))
                });
            let Some((pair, route)) = next else {
                break;
            };
            let (h1, h2) = pair.into_tuple();
            let moved = net.with_modified_path(&route);
            let before = net.max_path_load(&net.route(h1, h2));
            let after = moved.max_path_load(&route);
            if after <= before {
                debug!("Moving {pair}: peak utilization {before:.3} -> {after:.3}");
                net = moved;
            }
            considered.insert(pair);
        }
        Ok(Evaluation::new(net.routes().clone(), None))
    }
}
