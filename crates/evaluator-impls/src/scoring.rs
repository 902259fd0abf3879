use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use loadroute_core::{NodeId, NodePair, UsageStore};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Source of the random visiting order of host pairs. A seeded shuffler is deterministic across
/// runs; every call still gets a fresh stream.
#[derive(Debug)]
pub struct Shuffler {
    seed: Option<u64>,
    calls: AtomicU64,
}

impl Shuffler {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seed,
            calls: AtomicU64::new(0),
        }
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => {
                let n = self.calls.fetch_add(1, Ordering::Relaxed);
                StdRng::seed_from_u64(seed.wrapping_add(n))
            }
            None => StdRng::from_entropy(),
        }
    }
}

/// Every unordered pair of distinct hosts, in random order.
pub(crate) fn shuffled_pairs(hosts: &[NodeId], rng: &mut StdRng) -> Vec<NodePair> {
    let mut pairs = hosts
        .iter()
        .copied()
        .tuple_combinations()
        .map(|(a, b)| NodePair::new(a, b))
        .collect::<Vec<_>>();
    pairs.shuffle(rng);
    pairs
}

/// The links a path traverses.
pub(crate) fn links(path: &[NodeId]) -> Vec<NodePair> {
    path.windows(2).map(|w| NodePair::new(w[0], w[1])).collect()
}

/// Delay estimate of a path: every hop costs its utilization plus a fixed per-hop delay.
pub(crate) fn path_delay(path: &[NodeId], usage: &UsageStore<f64>, hop_delay: f64) -> f64 {
    links(path)
        .into_iter()
        .map(|link| usage.get(link) + hop_delay)
        .sum()
}

/// The delay term shared by the load-distance policies: each hop's delay plus its delay relative
/// to the shortest path, weighted by `m1`.
pub(crate) fn relative_delay(
    path: &[NodeId],
    usage: &UsageStore<f64>,
    hop_delay: f64,
    m1: f64,
    shortest_delay: f64,
) -> f64 {
    links(path)
        .into_iter()
        .map(|link| {
            let dp = usage.get(link) + hop_delay;
            if shortest_delay > 0.0 {
                dp + dp * m1 / shortest_delay
            } else {
                dp
            }
        })
        .sum()
}

/// The largest utilization over the path's links.
pub(crate) fn peak_usage(path: &[NodeId], usage: &UsageStore<f64>) -> f64 {
    links(path)
        .into_iter()
        .map(|link| usage.get(link))
        .fold(0.0, f64::max)
}

pub(crate) fn total_usage(path: &[NodeId], usage: &UsageStore<f64>) -> f64 {
    links(path).into_iter().map(|link| usage.get(link)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u32) -> NodeId {
        NodeId::host(n)
    }

    fn s(n: u32) -> NodeId {
        NodeId::switch(n)
    }

    #[test]
    fn seeded_shuffles_repeat() {
        let hosts = (1..=5).map(h).collect::<Vec<_>>();
        let a = shuffled_pairs(&hosts, &mut Shuffler::new(Some(7)).rng());
        let b = shuffled_pairs(&hosts, &mut Shuffler::new(Some(7)).rng());
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn delay_adds_hop_constant() {
        let usage = UsageStore::from_pairs([((s(1), s(2)), 0.5)], 0.0);
        let path = [h(1), s(1), s(2), h(2)];
        assert_eq!(path_delay(&path, &usage, 1.0), 3.5);
        assert_eq!(peak_usage(&path, &usage), 0.5);
        assert_eq!(total_usage(&path, &usage), 0.5);
        // Relative to itself with m1 = 1: every hop counts twice
        let relative = relative_delay(&path, &usage, 1.0, 1.0, 3.5);
        assert!((relative - 4.5).abs() < 1e-12);
    }
}
