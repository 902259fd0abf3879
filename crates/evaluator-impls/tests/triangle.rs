use std::sync::Arc;

use evaluator_impls::{for_policy, LdrEvaluator, MinMaxEvaluator, Shuffler};
use loadroute_core::{
    config::{ApaOpts, CostWeights, PredictionOpts},
    testing, Config, PathCache, PathEvaluator, Policy, Route, RouteTable, SimNetwork, Topology,
};

fn peak_utilization(topo: &Topology, net: &SimNetwork) -> f64 {
    topo.links()
        .iter()
        .map(|l| net.link_usage().get(l.pair()))
        .fold(0.0, f64::max)
}

fn apply(net: &SimNetwork, routes: &RouteTable) -> SimNetwork {
    routes
        .iter()
        .fold(net.clone(), |n, (_, route)| n.with_modified_path(route))
}

#[test]
fn minmax_beats_shared_shortest_path() -> anyhow::Result<()> {
    let topo = testing::triangle_topology()?;
    let cache = Arc::new(PathCache::compute(&topo));
    // Both pairs share the direct s1 - s2 link
    let net = testing::loaded_triangle_network(&topo, 40.0)?;
    let baseline = peak_utilization(&topo, &net);
    assert!((baseline - 1.6).abs() < 1e-9);

    for seed in 0..8 {
        let evaluator = MinMaxEvaluator::new(Arc::clone(&cache), Shuffler::new(Some(seed)));
        let eval = evaluator.evaluate(&net, None)?;
        let balanced = apply(&net, &eval.routes);
        let peak = peak_utilization(&topo, &balanced);
        assert!(peak <= baseline, "seed {seed}: {peak} > {baseline}");
        assert!((peak - 0.8).abs() < 1e-9, "seed {seed}: unexpected peak {peak}");
    }
    Ok(())
}

#[test]
fn ldr_single_does_not_worsen_the_bottleneck() -> anyhow::Result<()> {
    let topo = testing::triangle_topology()?;
    let cache = Arc::new(PathCache::compute(&topo));
    let net = testing::loaded_triangle_network(&topo, 40.0)?;
    let baseline = peak_utilization(&topo, &net);
    let config = Config::builder().policy(Policy::LdrSingle).build();
    let evaluator = for_policy(Policy::LdrSingle, cache, &config, Some(11));
    let eval = evaluator.evaluate(&net, None)?;
    let balanced = apply(&net, &eval.routes);
    assert!(peak_utilization(&topo, &balanced) <= baseline);
    Ok(())
}

#[test]
fn every_evaluator_keeps_every_pair() -> anyhow::Result<()> {
    let topo = testing::triangle_topology()?;
    let cache = Arc::new(PathCache::compute(&topo));
    let net = testing::loaded_triangle_network(&topo, 40.0)?;
    let config = Config::default();
    for policy in Policy::ALL {
        let evaluator = for_policy(policy, Arc::clone(&cache), &config, Some(5));
        let eval = evaluator.evaluate(&net, None)?;
        let mut merged = net.routes().clone();
        merged.merge(eval.routes);
        for (pair, route) in net.routes().iter() {
            let kept = merged.get(pair);
            assert!(!kept.is_empty(), "{policy} dropped {pair}");
            assert_eq!(kept.pair(), route.pair());
        }
    }
    Ok(())
}

#[test]
fn lp_splits_sum_to_one() -> anyhow::Result<()> {
    let topo = testing::triangle_topology()?;
    let cache = Arc::new(PathCache::compute(&topo));
    let net = testing::loaded_triangle_network(&topo, 40.0)?;
    let evaluator = LdrEvaluator::new(
        cache,
        CostWeights::default(),
        ApaOpts::default(),
        PredictionOpts::default(),
        Shuffler::new(Some(2)),
    );
    let eval = evaluator.evaluate(&net, None)?;
    assert_eq!(eval.routes.len(), 6);
    for (pair, route) in eval.routes.iter() {
        let Route::WeightedPaths(weighted) = route else {
            panic!("{pair} got a single path");
        };
        let total = weighted.iter().map(|(_, w)| w).sum::<f64>();
        assert!((total - 1.0).abs() < 1e-6, "{pair} splits sum to {total}");
        assert!(weighted.iter().all(|(_, w)| (0.0..=1.0).contains(&w)));
    }
    // The hedged prediction is carried into the next cycle
    let carried = eval.carried.expect("prediction should be carried");
    assert!(carried.values().any(|&rate| (rate - 44.0).abs() < 1e-9));
    Ok(())
}

#[test]
fn tight_stretch_keeps_previous_routes() -> anyhow::Result<()> {
    let topo = testing::linear_topology()?;
    let cache = Arc::new(PathCache::compute(&topo));
    let net = testing::loaded_linear_network(10.0)?;
    // A lone candidate always sits at stretch 1
    let evaluator = LdrEvaluator::new(
        cache,
        CostWeights::default(),
        ApaOpts::builder().path_stretch(1.0).build(),
        PredictionOpts::default(),
        Shuffler::new(None),
    );
    let eval = evaluator.evaluate(&net, None)?;
    assert_eq!(eval.routes.len(), 1);
    Ok(())
}
