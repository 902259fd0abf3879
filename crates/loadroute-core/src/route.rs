use std::collections::BTreeMap;

use crate::network::paths::{Path, PathCache};
use crate::network::types::{NodeId, NodePair};
use crate::store::UsageStore;

/// Forwarding splits at each switch: switch → next hop → share of the traffic, summing to 1.
pub type Transitions = BTreeMap<NodeId, BTreeMap<NodeId, f64>>;

/// Route assignments keyed by host pair.
pub type RouteTable = UsageStore<Route>;

/// How the traffic between a pair of hosts is forwarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// One host-to-host path. An empty path means no route has been assigned.
    SinglePath(Path),
    /// Several host-to-host paths, each carrying a share of the traffic.
    WeightedPaths(WeightedPaths),
}

impl Default for Route {
    fn default() -> Self {
        Route::SinglePath(Vec::new())
    }
}

impl Route {
    pub fn is_empty(&self) -> bool {
        match self {
            Route::SinglePath(path) => path.is_empty(),
            Route::WeightedPaths(_) => false,
        }
    }

    /// Every path of the route together with its weight. A single path weighs 1.
    pub fn alternatives(&self) -> Vec<(&Path, f64)> {
        match self {
            Route::SinglePath(path) if path.is_empty() => Vec::new(),
            Route::SinglePath(path) => vec![(path, 1.0)],
            Route::WeightedPaths(wp) => wp.iter().collect(),
        }
    }

    /// The hosts the route connects, as found on its first path.
    pub fn endpoints(&self) -> Option<(NodeId, NodeId)> {
        let path = match self {
            Route::SinglePath(path) => path,
            Route::WeightedPaths(wp) => wp.first(),
        };
        Some((*path.first()?, *path.last()?))
    }

    pub fn pair(&self) -> Option<NodePair> {
        self.endpoints().map(|(a, b)| NodePair::new(a, b))
    }

    /// The hop count of the shortest alternative, or `usize::MAX` for an empty route.
    pub fn shortest_len(&self) -> usize {
        self.alternatives()
            .iter()
            .map(|(p, _)| p.len())
            .min()
            .unwrap_or(usize::MAX)
    }

    /// Forwarding splits for the traffic leaving `from`.
    pub fn transitions(&self, from: NodeId) -> Transitions {
        transitions(self.alternatives(), from)
    }
}

/// A route table holding a shortest path for every connected pair of hosts.
pub fn shortest_routes(cache: &PathCache) -> RouteTable {
    let mut table = RouteTable::default();
    for (h1, h2) in cache.host_pairs() {
        if let Some(path) = cache.shortest_path(h1, h2) {
            table.set((h1, h2), Route::SinglePath(path));
        }
    }
    table
}

/// Paths with non-negative weights. Weights need not sum to 1; they are normalized when turned
/// into forwarding splits.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedPaths {
    paths: BTreeMap<Path, f64>,
}

impl WeightedPaths {
    pub fn new(paths: impl IntoIterator<Item = (Path, f64)>) -> Result<Self, RouteError> {
        let mut out = BTreeMap::new();
        for (path, weight) in paths {
            if path.is_empty() {
                return Err(RouteError::EmptyPath);
            }
            if !(weight >= 0.0) {
                return Err(RouteError::NegativeWeight { path, weight });
            }
            out.insert(path, weight);
        }
        if out.is_empty() {
            return Err(RouteError::NoPaths);
        }
        Ok(Self { paths: out })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, f64)> {
        self.paths.iter().map(|(p, &w)| (p, w))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn weight(&self, path: &Path) -> Option<f64> {
        self.paths.get(path).copied()
    }

    fn first(&self) -> &Path {
        // CORRECTNESS: `new` rejects an empty set of paths.
        self.paths.keys().next().unwrap_or(&EMPTY_PATH)
    }
}

static EMPTY_PATH: Path = Vec::new();

/// For every switch on any path oriented from `from`, the weight of each outgoing next hop is the
/// largest weight among the paths using that hop. Each switch's weights are then renormalized to
/// sum to 1, or split evenly if none is positive.
pub fn transitions<'a>(alternatives: impl IntoIterator<Item = (&'a Path, f64)>, from: NodeId) -> Transitions {
    let mut merged: Transitions = BTreeMap::new();
    for (path, weight) in alternatives {
        let oriented = if path.first() == Some(&from) {
            path.clone()
        } else {
            path.iter().rev().copied().collect()
        };
        for hop in oriented.windows(2) {
            let (node, next) = (hop[0], hop[1]);
            if !node.is_switch() {
                continue;
            }
            let entry = merged.entry(node).or_default().entry(next).or_insert(f64::NEG_INFINITY);
            if weight > *entry {
                *entry = weight;
            }
        }
    }
    for splits in merged.values_mut() {
        let total = splits.values().sum::<f64>();
        let n = splits.len() as f64;
        for w in splits.values_mut() {
            *w = if total <= 0.0 { 1.0 / n } else { *w / total };
        }
    }
    merged
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Weighted route has no paths")]
    NoPaths,

    #[error("Weighted route contains an empty path")]
    EmptyPath,

    #[error("Path {path:?} has invalid weight {weight}")]
    NegativeWeight { path: Path, weight: f64 },
}
