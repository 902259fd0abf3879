//! Shortest paths, simple-path enumeration and the alternate-path cache.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;

use dashmap::DashMap;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::network::topology::Topology;
use crate::network::types::NodeId;
use crate::units::Mbps;
use crate::utils;

/// An ordered, cycle-free sequence of nodes.
pub type Path = Vec<NodeId>;

/// Undirected adjacency: every node maps to its neighbors and the capacity of the link to each.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    adj: BTreeMap<NodeId, Vec<(NodeId, Mbps)>>,
}

impl Graph {
    /// Builds the adjacency of a topology. Neighbors keep link declaration order.
    pub fn from_topology(topology: &Topology) -> Self {
        let mut adj: BTreeMap<NodeId, Vec<(NodeId, Mbps)>> = BTreeMap::new();
        for &id in topology.hosts().iter().chain(topology.switches()) {
            adj.entry(id).or_default();
        }
        for link in topology.links() {
            let capacity = link.capacity_or_unlimited();
            adj.entry(link.a).or_default().push((link.b, capacity));
            adj.entry(link.b).or_default().push((link.a, capacity));
        }
        Self { adj }
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.adj.keys().copied()
    }

    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adj
            .get(&id)
            .into_iter()
            .flat_map(|ns| ns.iter().map(|&(n, _)| n))
    }

    pub fn capacity(&self, a: NodeId, b: NodeId) -> Option<Mbps> {
        self.adj
            .get(&a)?
            .iter()
            .find(|&&(n, _)| n == b)
            .map(|&(_, c)| c)
    }

    /// For every node, the nodes that have a link towards it.
    fn transition_map(&self) -> FxHashMap<NodeId, Vec<NodeId>> {
        let mut tm: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for (&source, targets) in &self.adj {
            for &(target, _) in targets {
                tm.entry(target).or_default().push(source);
            }
        }
        tm
    }
}

pub fn graph_from_topo(topology: &Topology) -> Graph {
    Graph::from_topology(topology)
}

/// Single-source hop-count distances and predecessors.
#[derive(Debug, Clone)]
pub struct ShortestPathTree {
    source: NodeId,
    dist: FxHashMap<NodeId, usize>,
    prev: FxHashMap<NodeId, NodeId>,
}

impl ShortestPathTree {
    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn distance_to(&self, target: NodeId) -> Option<usize> {
        self.dist.get(&target).copied()
    }

    /// Walks the predecessor chain back from `target`. Returns `None` if `target` is unreachable.
    /// The path from the source to itself is `[source]`.
    pub fn path_to(&self, target: NodeId) -> Option<Path> {
        if target != self.source && !self.prev.contains_key(&target) {
            return None;
        }
        let mut path = vec![target];
        let mut cur = target;
        while let Some(&p) = self.prev.get(&cur) {
            path.push(p);
            cur = p;
        }
        path.reverse();
        Some(path)
    }
}

/// Unit-weight Dijkstra from `source`. Among equally distant frontier nodes, the smallest node ID
/// is settled first; callers must not rely on which of several shortest paths is returned.
pub fn dijkstra(graph: &Graph, source: NodeId) -> ShortestPathTree {
    let mut dist = FxHashMap::default();
    let mut prev = FxHashMap::default();
    let mut settled = FxHashSet::default();
    let mut heap = BinaryHeap::new();
    dist.insert(source, 0);
    heap.push(Reverse((0, source)));
    while let Some(Reverse((d, node))) = heap.pop() {
        if !settled.insert(node) {
            continue;
        }
        for next in graph.neighbors(node) {
            let candidate = d + 1;
            if dist.get(&next).map_or(true, |&cur| candidate < cur) {
                dist.insert(next, candidate);
                prev.insert(next, node);
                heap.push(Reverse((candidate, next)));
            }
        }
    }
    ShortestPathTree { source, dist, prev }
}

/// A memo of [`dijkstra`] results keyed by source.
#[derive(Debug)]
pub struct ShortestPaths {
    graph: Arc<Graph>,
    trees: DashMap<NodeId, Arc<ShortestPathTree>>,
}

impl ShortestPaths {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            trees: DashMap::new(),
        }
    }

    pub fn tree_from(&self, source: NodeId) -> Arc<ShortestPathTree> {
        if let Some(tree) = self.trees.get(&source) {
            return Arc::clone(&tree);
        }
        let tree = Arc::new(dijkstra(&self.graph, source));
        self.trees.insert(source, Arc::clone(&tree));
        tree
    }

    pub fn path(&self, source: NodeId, target: NodeId) -> Option<Path> {
        self.tree_from(source).path_to(target)
    }

    pub fn distance(&self, source: NodeId, target: NodeId) -> Option<usize> {
        self.tree_from(source).distance_to(target)
    }
}

/// Enumerates every simple path from `initial` to `target`. The path from a node to itself is a
/// single empty path.
///
/// This is exponential in general graphs; results should be computed once per topology and
/// cached (see [`AlternatePaths`]).
pub fn find_all_paths(graph: &Graph, initial: NodeId, target: NodeId) -> Vec<Path> {
    if initial == target {
        return vec![Vec::new()];
    }
    let tm = graph.transition_map();
    let mut paths = Vec::new();
    let mut acc = Vec::new();
    let mut on_path = FxHashSet::default();
    dfs(&tm, initial, target, &mut acc, &mut on_path, &mut paths);
    paths
}

fn dfs(
    tm: &FxHashMap<NodeId, Vec<NodeId>>,
    node: NodeId,
    target: NodeId,
    acc: &mut Path,
    on_path: &mut FxHashSet<NodeId>,
    paths: &mut Vec<Path>,
) {
    acc.push(node);
    on_path.insert(node);
    if node == target {
        paths.push(acc.clone());
    } else if let Some(nexts) = tm.get(&node) {
        for &next in nexts {
            if !on_path.contains(&next) {
                dfs(tm, next, target, acc, on_path, paths);
            }
        }
    }
    on_path.remove(&node);
    acc.pop();
}

/// Keeps the candidates that never traverse a hop in the opposite direction of an earlier
/// accepted candidate, so that the union of accepted paths forms no forwarding loop.
///
/// Candidates are considered shortest first, then by comparing node names as strings, so `s10`
/// precedes `s2`. If `through` is given, only candidates visiting that node are considered.
/// Accepted paths are oriented from `h1` to `h2`.
pub fn loop_free_alternatives(
    h1: NodeId,
    h2: NodeId,
    candidates: &[Path],
    through: Option<NodeId>,
) -> Vec<Path> {
    let mut sorted = candidates.iter().collect::<Vec<_>>();
    sorted.sort_by_cached_key(|p| (p.len(), p.iter().map(NodeId::to_string).collect::<Vec<_>>()));
    let mut accepted = Vec::new();
    let mut reversed_hops = FxHashSet::default();
    for path in sorted {
        if through.map_or(false, |sw| !path.contains(&sw)) {
            continue;
        }
        let mut path = path.clone();
        if path.first() == Some(&h2) && path.last() == Some(&h1) {
            path.reverse();
        }
        let hops = path.windows(2).map(|w| (w[0], w[1])).collect::<Vec<_>>();
        if hops.iter().any(|hop| reversed_hops.contains(hop)) {
            continue;
        }
        reversed_hops.extend(hops.into_iter().map(|(a, b)| (b, a)));
        accepted.push(path);
    }
    accepted
}

/// The alternate-path availability matrix: every simple path between every pair of hosts, indexed
/// by host order. The matrix is symmetric.
#[derive(Debug, Clone)]
pub struct AlternatePaths {
    hosts: Vec<NodeId>,
    index: FxHashMap<NodeId, usize>,
    cells: Vec<Vec<Arc<[Path]>>>,
}

impl AlternatePaths {
    /// Enumerates all host-pair paths, spreading the upper triangle of the matrix across cores.
    pub fn compute(graph: &Graph, hosts: &[NodeId]) -> Self {
        let n = hosts.len();
        let pairs = (0..n)
            .flat_map(|i| (i..n).map(move |j| (i, j)))
            .collect::<Vec<_>>();
        let mut cells = vec![vec![Arc::<[Path]>::from(Vec::new()); n]; n];
        let computed = utils::par_chunks(&pairs, |chunk| {
            chunk
                .iter()
                .map(|&(i, j)| {
                    let paths: Arc<[Path]> = find_all_paths(graph, hosts[i], hosts[j]).into();
                    (i, j, paths)
                })
                .collect()
        });
        for (i, j, paths) in computed {
            cells[j][i] = Arc::clone(&paths);
            cells[i][j] = paths;
        }
        Self::assemble(hosts.to_vec(), cells)
    }

    /// Rebuilds a matrix read back from storage, rejecting one that does not fit `hosts`.
    pub fn from_matrix(
        hosts: &[NodeId],
        matrix: Vec<Vec<Vec<Path>>>,
    ) -> Result<Self, AlternatesError> {
        let n = hosts.len();
        if matrix.len() != n {
            return Err(AlternatesError::WrongDimension {
                expected: n,
                got: matrix.len(),
            });
        }
        let mut cells = Vec::with_capacity(n);
        for (i, row) in matrix.into_iter().enumerate() {
            if row.len() != n {
                return Err(AlternatesError::WrongDimension {
                    expected: n,
                    got: row.len(),
                });
            }
            let mut out = Vec::with_capacity(n);
            for (j, paths) in row.into_iter().enumerate() {
                for path in &paths {
                    let fits = match (path.first(), path.last()) {
                        (Some(&a), Some(&b)) => {
                            (a, b) == (hosts[i], hosts[j]) || (a, b) == (hosts[j], hosts[i])
                        }
                        _ => i == j,
                    };
                    if !fits {
                        return Err(AlternatesError::WrongEndpoints {
                            h1: hosts[i],
                            h2: hosts[j],
                        });
                    }
                }
                out.push(Arc::<[Path]>::from(paths));
            }
            cells.push(out);
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if cells[i][j] != cells[j][i] {
                    return Err(AlternatesError::Asymmetric {
                        h1: hosts[i],
                        h2: hosts[j],
                    });
                }
            }
        }
        Ok(Self::assemble(hosts.to_vec(), cells))
    }

    fn assemble(hosts: Vec<NodeId>, cells: Vec<Vec<Arc<[Path]>>>) -> Self {
        let index = hosts.iter().enumerate().map(|(i, &h)| (h, i)).collect();
        Self {
            hosts,
            index,
            cells,
        }
    }

    pub fn hosts(&self) -> &[NodeId] {
        &self.hosts
    }

    /// All simple paths between two hosts, or nothing if either is unknown.
    pub fn between(&self, h1: NodeId, h2: NodeId) -> &[Path] {
        match (self.index.get(&h1), self.index.get(&h2)) {
            (Some(&i), Some(&j)) => &self.cells[i][j],
            _ => &[],
        }
    }

    /// The matrix in storable form.
    pub fn to_matrix(&self) -> Vec<Vec<Vec<Path>>> {
        self.cells
            .iter()
            .map(|row| row.iter().map(|paths| paths.to_vec()).collect())
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlternatesError {
    #[error("Alternate-path matrix has dimension {got} (expected {expected})")]
    WrongDimension { expected: usize, got: usize },

    #[error("Alternate paths between {h1} and {h2} do not connect them")]
    WrongEndpoints { h1: NodeId, h2: NodeId },

    #[error("Alternate paths between {h1} and {h2} differ by direction")]
    Asymmetric { h1: NodeId, h2: NodeId },
}

/// Graph-derived lookups shared by every component: built once from the loaded topology.
#[derive(Debug)]
pub struct PathCache {
    graph: Arc<Graph>,
    shortest: ShortestPaths,
    alternates: AlternatePaths,
}

impl PathCache {
    pub fn new(graph: Graph, alternates: AlternatePaths) -> Self {
        let graph = Arc::new(graph);
        Self {
            shortest: ShortestPaths::new(Arc::clone(&graph)),
            graph,
            alternates,
        }
    }

    /// Builds the cache, enumerating the alternate paths of `topology` from scratch.
    pub fn compute(topology: &Topology) -> Self {
        let graph = Graph::from_topology(topology);
        let alternates = AlternatePaths::compute(&graph, topology.hosts());
        log::debug!(
            "Enumerated alternate paths between {} hosts",
            topology.hosts().len()
        );
        Self::new(graph, alternates)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn hosts(&self) -> &[NodeId] {
        self.alternates.hosts()
    }

    pub fn shortest(&self) -> &ShortestPaths {
        &self.shortest
    }

    pub fn shortest_path(&self, source: NodeId, target: NodeId) -> Option<Path> {
        self.shortest.path(source, target)
    }

    /// The first hop on a shortest path from `from` to `to`.
    pub fn next_hop(&self, from: NodeId, to: NodeId) -> Option<NodeId> {
        self.shortest_path(from, to)
            .and_then(|path| path.get(1).copied())
    }

    pub fn alternates(&self) -> &AlternatePaths {
        &self.alternates
    }

    pub fn alternates_between(&self, h1: NodeId, h2: NodeId) -> &[Path] {
        self.alternates.between(h1, h2)
    }

    /// Every unordered pair of distinct hosts, in host order.
    pub fn host_pairs(&self) -> Vec<(NodeId, NodeId)> {
        self.hosts().iter().copied().tuple_combinations().collect()
    }
}

#[cfg(test)]
mod tests {
    use petgraph::algo;

    use super::*;
    use crate::testing;

    fn h(n: u32) -> NodeId {
        NodeId::host(n)
    }

    fn s(n: u32) -> NodeId {
        NodeId::switch(n)
    }

    #[test]
    fn linear_shortest_path() -> anyhow::Result<()> {
        let topo = testing::linear_topology()?;
        let tree = dijkstra(&graph_from_topo(&topo), h(1));
        assert_eq!(tree.distance_to(h(2)), Some(3));
        assert_eq!(tree.path_to(h(2)), Some(vec![h(1), s(1), s(2), h(2)]));
        assert_eq!(tree.path_to(h(1)), Some(vec![h(1)]));
        assert_eq!(tree.distance_to(h(1)), Some(0));
        Ok(())
    }

    #[test]
    fn unreachable_has_no_path() -> anyhow::Result<()> {
        let topo = Topology::new(
            &[h(1), h(2)],
            &[s(1), s(2)],
            &[
                crate::Link::new(h(1), s(1), None),
                crate::Link::new(h(2), s(2), None),
            ],
        )?;
        let tree = dijkstra(&graph_from_topo(&topo), h(1));
        assert_eq!(tree.path_to(h(2)), None);
        assert_eq!(tree.distance_to(h(2)), None);
        Ok(())
    }

    #[test]
    fn distances_agree_with_petgraph() -> anyhow::Result<()> {
        let topo = testing::eight_node_topology()?;
        let graph = graph_from_topo(&topo);
        let g = &topo.graph;
        for start in g.node_indices() {
            let expected = algo::dijkstra(g, start, None, |_| 1usize);
            let tree = dijkstra(&graph, g[start]);
            for (idx, d) in expected {
                assert_eq!(tree.distance_to(g[idx]), Some(d));
                let path = tree.path_to(g[idx]).unwrap();
                assert_eq!(path.len(), d + 1);
            }
        }
        Ok(())
    }

    #[test]
    fn memo_reuses_trees() -> anyhow::Result<()> {
        let topo = testing::linear_topology()?;
        let sp = ShortestPaths::new(Arc::new(graph_from_topo(&topo)));
        let a = sp.tree_from(h(1));
        let b = sp.tree_from(h(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(sp.distance(h(1), h(2)), Some(3));
        Ok(())
    }

    #[test]
    fn square_has_two_simple_paths() -> anyhow::Result<()> {
        let topo = testing::square_topology()?;
        let graph = graph_from_topo(&topo);
        let mut paths = find_all_paths(&graph, s(1), s(3));
        paths.sort();
        assert_eq!(
            paths,
            vec![vec![s(1), s(2), s(3)], vec![s(1), s(4), s(3)]]
        );
        for path in &paths {
            let unique = path.iter().collect::<FxHashSet<_>>();
            assert_eq!(unique.len(), path.len());
        }
        Ok(())
    }

    #[test]
    fn eight_node_alternates() -> anyhow::Result<()> {
        let topo = testing::eight_node_topology()?;
        let apa = AlternatePaths::compute(&graph_from_topo(&topo), topo.hosts());
        let mut paths = apa
            .between(h(1), h(3))
            .iter()
            .map(|p| p.iter().map(|n| n.to_string()).join("-"))
            .collect::<Vec<_>>();
        paths.sort();
        insta::assert_yaml_snapshot!(paths, @r###"
        ---
        - h1-s1-s3-s2-h3
        - h1-s1-s4-s2-h3
        "###);
        assert!(apa.between(h(1), h(2)).iter().all(|p| p.len() == 3));
        Ok(())
    }

    #[test]
    fn path_to_self_is_empty() -> anyhow::Result<()> {
        let topo = testing::linear_topology()?;
        let paths = find_all_paths(&graph_from_topo(&topo), h(1), h(1));
        assert_eq!(paths, vec![Vec::<NodeId>::new()]);
        Ok(())
    }

    #[test]
    fn alternates_are_symmetric() -> anyhow::Result<()> {
        let topo = testing::triangle_topology()?;
        let apa = AlternatePaths::compute(&graph_from_topo(&topo), topo.hosts());
        for &a in topo.hosts() {
            for &b in topo.hosts() {
                assert_eq!(apa.between(a, b), apa.between(b, a));
            }
        }
        // h1 and h3 hang off s1 and s2: direct and via s3
        assert_eq!(apa.between(h(1), h(3)).len(), 2);
        assert!(apa.between(h(1), NodeId::host(99)).is_empty());
        Ok(())
    }

    #[test]
    fn malformed_matrix_is_rejected() -> anyhow::Result<()> {
        let topo = testing::linear_topology()?;
        let apa = AlternatePaths::compute(&graph_from_topo(&topo), topo.hosts());
        let mut matrix = apa.to_matrix();
        assert!(AlternatePaths::from_matrix(topo.hosts(), matrix.clone()).is_ok());
        matrix[0][1] = vec![vec![h(1), s(1), h(2)], vec![h(1), s(1), s(2), h(2)]];
        assert!(matches!(
            AlternatePaths::from_matrix(topo.hosts(), matrix.clone()),
            Err(AlternatesError::Asymmetric { .. })
        ));
        matrix.pop();
        assert!(matches!(
            AlternatePaths::from_matrix(topo.hosts(), matrix),
            Err(AlternatesError::WrongDimension { .. })
        ));
        Ok(())
    }

    #[test]
    fn loop_free_filter_rejects_reversed_hops() {
        let (h1, h2) = (h(1), h(2));
        let candidates = vec![
            vec![h1, s(1), s(2), h2],
            vec![h1, s(1), s(3), s(2), h2],
            // Would forward s2 -> s1 after s1 -> s2 is already in use
            vec![h1, s(1), s(3), s(2), s(1), h2],
            // Reversed orientation is normalized before checking
            vec![h2, s(2), s(4), s(1), h1],
        ];
        let accepted = loop_free_alternatives(h1, h2, &candidates, None);
        assert_eq!(
            accepted,
            vec![
                vec![h1, s(1), s(2), h2],
                vec![h1, s(1), s(3), s(2), h2],
                vec![h1, s(1), s(4), s(2), h2],
            ]
        );
        let through = loop_free_alternatives(h1, h2, &candidates, Some(s(3)));
        assert_eq!(through, vec![vec![h1, s(1), s(3), s(2), h2]]);
    }

    #[test]
    fn loop_free_ties_compare_names() {
        let (h1, h2) = (h(1), h(2));
        // Equal length, and each uses s2 - s10 in the direction the other forbids
        let candidates = vec![
            vec![h1, s(1), s(2), s(10), h2],
            vec![h1, s(1), s(10), s(2), h2],
        ];
        let accepted = loop_free_alternatives(h1, h2, &candidates, None);
        assert_eq!(accepted, vec![vec![h1, s(1), s(10), s(2), h2]]);
    }

    #[test]
    fn next_hop_follows_shortest_path() -> anyhow::Result<()> {
        let cache = PathCache::compute(&testing::linear_topology()?);
        assert_eq!(cache.next_hop(s(1), h(2)), Some(s(2)));
        assert_eq!(cache.next_hop(s(2), h(2)), Some(h(2)));
        assert_eq!(cache.host_pairs(), vec![(h(1), h(2))]);
        Ok(())
    }
}
