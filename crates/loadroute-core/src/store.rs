//! Symmetric link-keyed maps and the read-through views aggregated from them.
//!
//! Every key is a [`NodePair`], so `(a, b)` and `(b, a)` always address the same entry. Views
//! recompute on each read; call [`ReadThrough::snapshot`] to materialize one.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::network::types::{FlowKey, FlowLedger, NodePair};

/// Combines the values found for one key across several sources.
pub type Reducer = fn(&[f64]) -> f64;

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

/// A canonical-pair-keyed map with a declared default for absent keys.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageStore<V> {
    pairs: FxHashMap<NodePair, V>,
    default: V,
}

impl<V: Default> Default for UsageStore<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V> UsageStore<V> {
    pub fn new(default: V) -> Self {
        Self {
            pairs: FxHashMap::default(),
            default,
        }
    }

    pub fn from_pairs<K, I>(pairs: I, default: V) -> Self
    where
        K: Into<NodePair>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut store = Self::new(default);
        for (k, v) in pairs {
            store.set(k, v);
        }
        store
    }

    /// The stored value, without falling back to the default.
    pub fn lookup(&self, key: impl Into<NodePair>) -> Option<&V> {
        self.pairs.get(&key.into())
    }

    pub fn set(&mut self, key: impl Into<NodePair>, value: V) -> Option<V> {
        self.pairs.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: impl Into<NodePair>) -> Option<V> {
        self.pairs.remove(&key.into())
    }

    pub fn contains(&self, key: impl Into<NodePair>) -> bool {
        self.pairs.contains_key(&key.into())
    }

    pub fn default_value(&self) -> &V {
        &self.default
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodePair, &V)> {
        self.pairs.iter().map(|(&k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = NodePair> + '_ {
        self.pairs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Overwrites the entries of `self` with every entry of `other`.
    pub fn merge(&mut self, other: UsageStore<V>) {
        self.pairs.extend(other.pairs);
    }

    /// All keys whose value equals `value`.
    pub fn reverse_lookup(&self, value: &V) -> Vec<NodePair>
    where
        V: PartialEq,
    {
        self.pairs
            .iter()
            .filter(|&(_, v)| v == value)
            .map(|(&k, _)| k)
            .collect()
    }
}

impl<V: Clone> UsageStore<V> {
    /// The stored value, or the default if `key` is absent.
    pub fn get(&self, key: impl Into<NodePair>) -> V {
        self.lookup(key).unwrap_or(&self.default).clone()
    }

    /// Combines each entry of `self` with the value `other` holds for the same key.
    ///
    /// Only the keys of `self` are visited: keys present in `other` alone do not appear in the
    /// result.
    pub fn calculate<W, R, F>(&self, other: &UsageStore<W>, op: F) -> UsageStore<R>
    where
        W: Clone,
        R: Default,
        F: Fn(&V, W) -> R,
    {
        let mut out = UsageStore::new(R::default());
        for (&k, v) in &self.pairs {
            out.pairs.insert(k, op(v, other.get(k)));
        }
        out
    }
}

/// A link-keyed source of values that may be computed on read.
pub trait ReadThrough {
    type Value;

    /// The value for `key`, or the source's default.
    fn value(&self, key: NodePair) -> Self::Value;

    /// The value for `key`, if the source has one.
    fn find(&self, key: NodePair) -> Option<Self::Value>;

    fn keys(&self) -> Vec<NodePair>;

    /// Materializes every value into a plain store.
    fn snapshot(&self) -> UsageStore<Self::Value>;
}

impl<V: Clone> ReadThrough for UsageStore<V> {
    type Value = V;

    fn value(&self, key: NodePair) -> V {
        self.get(key)
    }

    fn find(&self, key: NodePair) -> Option<V> {
        self.lookup(key).cloned()
    }

    fn keys(&self) -> Vec<NodePair> {
        self.pairs.keys().copied().collect()
    }

    fn snapshot(&self) -> UsageStore<V> {
        self.clone()
    }
}

impl<T: ReadThrough + ?Sized> ReadThrough for &T {
    type Value = T::Value;

    fn value(&self, key: NodePair) -> Self::Value {
        (**self).value(key)
    }

    fn find(&self, key: NodePair) -> Option<Self::Value> {
        (**self).find(key)
    }

    fn keys(&self) -> Vec<NodePair> {
        (**self).keys()
    }

    fn snapshot(&self) -> UsageStore<Self::Value> {
        (**self).snapshot()
    }
}

/// Per-link totals of a flow ledger: every flow share is grouped by the link it travels over and
/// the group is reduced (summed by default).
#[derive(Debug, Clone, Copy)]
pub struct FlowLinkView<'a> {
    ledger: &'a FlowLedger,
    reduce: Reducer,
}

impl<'a> FlowLinkView<'a> {
    pub fn new(ledger: &'a FlowLedger) -> Self {
        Self::with_reducer(ledger, sum)
    }

    pub fn with_reducer(ledger: &'a FlowLedger, reduce: Reducer) -> Self {
        Self { ledger, reduce }
    }

    fn shares(&self, key: NodePair) -> Vec<f64> {
        self.ledger
            .iter()
            .filter(|(k, _)| k.link() == key)
            .map(|(_, &v)| v)
            .collect()
    }
}

impl ReadThrough for FlowLinkView<'_> {
    type Value = f64;

    fn value(&self, key: NodePair) -> f64 {
        self.find(key).unwrap_or(0.0)
    }

    fn find(&self, key: NodePair) -> Option<f64> {
        let shares = self.shares(key);
        (!shares.is_empty()).then(|| (self.reduce)(&shares))
    }

    fn keys(&self) -> Vec<NodePair> {
        self.ledger
            .keys()
            .map(FlowKey::link)
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect()
    }

    fn snapshot(&self) -> UsageStore<f64> {
        let mut groups: FxHashMap<NodePair, Vec<f64>> = FxHashMap::default();
        for (k, &v) in self.ledger {
            groups.entry(k.link()).or_default().push(v);
        }
        UsageStore::from_pairs(
            groups.into_iter().map(|(k, vs)| (k, (self.reduce)(&vs))),
            0.0,
        )
    }
}

/// Combines the same key across a collection of sources (e.g. every switch of a network).
#[derive(Debug, Clone)]
pub struct AggregateView<S> {
    sources: Vec<S>,
    reduce: Reducer,
}

impl<S: ReadThrough<Value = f64>> AggregateView<S> {
    pub fn new(sources: Vec<S>, reduce: Reducer) -> Self {
        Self { sources, reduce }
    }

    /// Detaches the view from its sources by materializing each of them.
    pub fn freeze(&self) -> AggregateView<UsageStore<f64>> {
        AggregateView {
            sources: self.sources.iter().map(ReadThrough::snapshot).collect(),
            reduce: self.reduce,
        }
    }
}

impl<S: ReadThrough<Value = f64>> ReadThrough for AggregateView<S> {
    type Value = f64;

    fn value(&self, key: NodePair) -> f64 {
        let found = self
            .sources
            .iter()
            .filter_map(|s| s.find(key))
            .collect::<Vec<_>>();
        (self.reduce)(&found)
    }

    fn find(&self, key: NodePair) -> Option<f64> {
        let found = self
            .sources
            .iter()
            .filter_map(|s| s.find(key))
            .collect::<Vec<_>>();
        (!found.is_empty()).then(|| (self.reduce)(&found))
    }

    fn keys(&self) -> Vec<NodePair> {
        self.sources
            .iter()
            .flat_map(ReadThrough::keys)
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect()
    }

    fn snapshot(&self) -> UsageStore<f64> {
        let snapshots = self
            .sources
            .iter()
            .map(ReadThrough::snapshot)
            .collect::<Vec<_>>();
        let mut groups: FxHashMap<NodePair, Vec<f64>> = FxHashMap::default();
        for s in &snapshots {
            for (k, &v) in s.iter() {
                groups.entry(k).or_default().push(v);
            }
        }
        UsageStore::from_pairs(
            groups.into_iter().map(|(k, vs)| (k, (self.reduce)(&vs))),
            0.0,
        )
    }
}

/// First-match lookup across an ordered list of maps.
#[derive(Debug, Clone)]
pub struct FallbackChain<'a, K, V> {
    maps: Vec<&'a FxHashMap<K, V>>,
}

impl<'a, K: Hash + Eq + Copy, V> FallbackChain<'a, K, V> {
    pub fn new(maps: Vec<&'a FxHashMap<K, V>>) -> Self {
        Self { maps }
    }

    pub fn get(&self, key: &K) -> Option<&'a V> {
        self.maps.iter().find_map(|m| m.get(key))
    }

    pub fn keys(&self) -> FxHashSet<K> {
        self.maps.iter().flat_map(|m| m.keys().copied()).collect()
    }

    /// Every key with the value of its first match.
    pub fn entries(&self) -> Vec<(K, &'a V)> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.get(&k).map(|v| (k, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::NodeId;

    fn h(n: u32) -> NodeId {
        NodeId::host(n)
    }

    fn s(n: u32) -> NodeId {
        NodeId::switch(n)
    }

    #[test]
    fn set_then_get_reversed() {
        let mut store = UsageStore::new(0.0);
        store.set((h(1), s(2)), 3.5);
        store.set((s(4), s(3)), 1.0);
        assert_eq!(store.get((s(2), h(1))), 3.5);
        assert_eq!(store.get((s(3), s(4))), 1.0);
        assert!(store.contains((s(3), s(4))));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn absent_key_reads_default() {
        let store: UsageStore<Vec<u32>> = UsageStore::new(vec![7]);
        assert_eq!(store.get((h(1), h(2))), vec![7]);
        assert_eq!(store.lookup((h(1), h(2))), None);
    }

    #[test]
    fn calculate_ignores_keys_only_in_other() {
        let a = UsageStore::from_pairs([((s(1), s(2)), 10.0), ((s(2), s(3)), 4.0)], 0.0);
        let b = UsageStore::from_pairs([((s(2), s(1)), 5.0), ((s(3), s(4)), 1.0)], 0.0);
        let ratio = a.calculate(&b, |&x, y| if y > 0.0 { x / y } else { -1.0 });
        assert_eq!(ratio.len(), 2);
        assert_eq!(ratio.get((s(1), s(2))), 2.0);
        assert_eq!(ratio.get((s(2), s(3))), -1.0);
        assert!(!ratio.contains((s(3), s(4))));
    }

    #[test]
    fn reverse_lookup_finds_keys() {
        let store = UsageStore::from_pairs([((s(1), s(2)), 1), ((s(2), s(3)), 2), ((s(4), s(3)), 1)], 0);
        let mut keys = store.reverse_lookup(&1);
        keys.sort();
        assert_eq!(
            keys,
            vec![NodePair::new(s(1), s(2)), NodePair::new(s(3), s(4))]
        );
    }

    fn ledger() -> FlowLedger {
        [
            (FlowKey::new(Some(h(1)), s(1), s(2), h(2)), 3.0),
            (FlowKey::new(Some(h(2)), s(2), s(1), h(1)), 1.0),
            (FlowKey::new(Some(h(1)), s(2), h(2), h(2)), 3.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn flow_view_groups_by_link() {
        let ledger = ledger();
        let view = FlowLinkView::new(&ledger);
        assert_eq!(view.value(NodePair::new(s(2), s(1))), 4.0);
        assert_eq!(view.value(NodePair::new(h(2), s(2))), 3.0);
        assert_eq!(view.find(NodePair::new(s(3), s(1))), None);
        let peak = FlowLinkView::with_reducer(&ledger, max);
        assert_eq!(peak.value(NodePair::new(s(1), s(2))), 3.0);
        let snap = view.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get((s(1), s(2))), 4.0);
    }

    #[test]
    fn aggregate_view_sums_sources_and_freezes() {
        let mut first = ledger();
        let second: FlowLedger = [(FlowKey::new(None, s(2), s(1), h(1)), 2.0)]
            .into_iter()
            .collect();
        let frozen = {
            let view = AggregateView::new(
                vec![FlowLinkView::new(&first), FlowLinkView::new(&second)],
                sum,
            );
            assert_eq!(view.value(NodePair::new(s(1), s(2))), 6.0);
            assert_eq!(view.keys().len(), 2);
            view.freeze()
        };
        first.clear();
        assert_eq!(frozen.value(NodePair::new(s(1), s(2))), 6.0);
        assert_eq!(frozen.snapshot().get((s(2), h(2))), 3.0);
    }

    #[test]
    fn fallback_chain_takes_first_match() {
        let a: FxHashMap<u32, &str> = [(1, "a1"), (2, "a2")].into_iter().collect();
        let b: FxHashMap<u32, &str> = [(2, "b2"), (3, "b3")].into_iter().collect();
        let chain = FallbackChain::new(vec![&a, &b]);
        assert_eq!(chain.get(&2), Some(&"a2"));
        assert_eq!(chain.get(&3), Some(&"b3"));
        assert_eq!(chain.get(&4), None);
        assert_eq!(chain.keys().len(), 3);
    }
}
