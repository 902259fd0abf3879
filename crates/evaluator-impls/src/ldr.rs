//! LP-optimal multi-path splitting.

use std::sync::Arc;

use anyhow::Context;
use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, Solution, SolverModel,
    Variable,
};
use log::{debug, info};
use loadroute_core::{
    config::{ApaOpts, CostWeights, PredictionOpts},
    EvaluateError, Evaluation, NodePair, Path, PathCache, PathEvaluator, Prediction, Route,
    RouteTable, SimNetwork, WeightedPaths,
};
use rand::seq::SliceRandom;

use crate::scoring::{self, Shuffler};

/// Splits every host pair's traffic over its candidate paths by solving one linear program over
/// the whole network.
///
/// Loads are taken from the hedged prediction rather than the raw measurement, so a single quiet
/// sample does not immediately pull traffic back. Candidates are limited to paths whose delay is
/// within the configured stretch of the shortest path; pairs left without a candidate keep their
/// current route.
#[derive(Debug, derive_new::new)]
pub struct LdrEvaluator {
    cache: Arc<PathCache>,
    cost: CostWeights,
    apa: ApaOpts,
    prediction: PredictionOpts,
    shuffler: Shuffler,
}

/// The split variables of one host pair.
#[derive(Debug)]
struct PairSplit {
    pair: NodePair,
    paths: Vec<(Path, Variable)>,
}

impl LdrEvaluator {
    fn candidates(&self, net: &SimNetwork, pair: NodePair) -> Vec<Path> {
        let usage = net.link_usage();
        let hop_delay = self.cost.hop_delay;
        let (h1, h2) = pair.into_tuple();
        let Some(shortest) = self.cache.shortest_path(h1, h2) else {
            return Vec::new();
        };
        let shortest_delay = scoring::path_delay(&shortest, usage, hop_delay);
        if shortest_delay <= 0.0 {
            return Vec::new();
        }
        self.cache
            .alternates_between(h1, h2)
            .iter()
            .filter(|path| {
                scoring::path_delay(path, usage, hop_delay) / shortest_delay <= self.apa.path_stretch
            })
            .cloned()
            .collect()
    }

    fn solve(&self, net: &SimNetwork) -> anyhow::Result<RouteTable> {
        let CostWeights { m1, m2, hop_delay } = self.cost;
        let usage = net.link_usage();
        let flows = net.link_flows();
        let mut rng = self.shuffler.rng();
        let mut vars = ProblemVariables::new();
        let mut objective = Vec::<Expression>::new();
        let mut splits = Vec::new();
        for pair in scoring::shuffled_pairs(self.cache.hosts(), &mut rng) {
            let mut candidates = self.candidates(net, pair);
            if candidates.is_empty() {
                debug!("No candidate within the stretch bound for {pair}");
                continue;
            }
            candidates.shuffle(&mut rng);
            let (h1, h2) = pair.into_tuple();
            let shortest_delay = self
                .cache
                .shortest_path(h1, h2)
                .map(|p| scoring::path_delay(&p, usage, hop_delay))
                .unwrap_or(0.0);
            let active = candidates
                .iter()
                .flat_map(|p| scoring::links(p))
                .map(|link| f64::from(flows.get(link)))
                .sum::<f64>()
                .max(f64::MIN_POSITIVE);
            let mut paths = Vec::with_capacity(candidates.len());
            for path in candidates {
                let x = vars.add(variable().min(0.0).max(1.0));
                let tiebreak = scoring::relative_delay(&path, usage, hop_delay, m1, shortest_delay);
                let cost = tiebreak
                    + m2 * scoring::peak_usage(&path, usage)
                    + scoring::total_usage(&path, usage);
                objective.push(x * (active * cost));
                paths.push((path, x));
            }
            splits.push(PairSplit { pair, paths });
        }
        if splits.is_empty() {
            return Ok(RouteTable::default());
        }
        let objective: Expression = objective.into_iter().sum();
        let mut model = vars.minimise(objective).using(default_solver);
        for split in &splits {
            let total: Expression = split.paths.iter().map(|&(_, x)| x).sum();
            model = model.with(constraint!(total == 1.0));
        }
        let solution = model.solve().context("failed to solve the path-split program")?;
        let mut routes = RouteTable::default();
        for PairSplit { pair, paths } in splits {
            let weighted = paths
                .into_iter()
                .map(|(path, x)| (path, solution.value(x).clamp(0.0, 1.0)));
            let weighted = WeightedPaths::new(weighted)
                .with_context(|| format!("invalid split for {pair}"))?;
            routes.set(pair, Route::WeightedPaths(weighted));
        }
        Ok(routes)
    }
}

impl PathEvaluator for LdrEvaluator {
    fn evaluate(
        &self,
        network: &SimNetwork,
        carried: Option<&Prediction>,
    ) -> Result<Evaluation, EvaluateError> {
        let PredictionOpts { hedge, decay } = self.prediction;
        let (predicted, prediction) = network.copy_scaling(carried, hedge, decay);
        let routes = self.solve(&predicted)?;
        info!("Split program assigned {} host pairs", routes.len());
        Ok(Evaluation::new(routes, Some(prediction)))
    }
}
