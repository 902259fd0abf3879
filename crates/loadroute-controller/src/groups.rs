use loadroute_core::constants::BUCKET_WEIGHT_SCALE;
use loadroute_core::{GroupId, NodeId, Port};
use rustc_hash::FxHashMap;

use crate::southbound::{Bucket, GroupCommand};

/// Select-group identities and their current buckets, shared by every switch.
///
/// A group is allocated once per (source host, switch, destination host) and modified in place
/// afterwards. The bucket table is what stats replies are resolved against.
#[derive(Debug, Default)]
pub struct GroupTable {
    ids: FxHashMap<(NodeId, NodeId, NodeId), GroupId>,
    buckets: FxHashMap<GroupId, Vec<Bucket>>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the group of `src -> dst` traffic at `switch` and whether it must be added or
    /// modified.
    pub fn allocate(&mut self, src: NodeId, switch: NodeId, dst: NodeId) -> (GroupId, GroupCommand) {
        let next = GroupId::new(self.ids.len() as u32 + 1);
        match self.ids.get(&(src, switch, dst)) {
            Some(&id) => (id, GroupCommand::Modify),
            None => {
                self.ids.insert((src, switch, dst), next);
                (next, GroupCommand::Add)
            }
        }
    }

    pub fn set_buckets(&mut self, group: GroupId, buckets: Vec<Bucket>) {
        self.buckets.insert(group, buckets);
    }

    pub fn buckets(&self, group: GroupId) -> Option<&[Bucket]> {
        self.buckets.get(&group).map(Vec::as_slice)
    }

    /// The share of the group's traffic each bucket's port carries. Empty for unknown groups.
    pub fn shares(&self, group: GroupId) -> Vec<(Port, f64)> {
        let buckets = self.buckets(group).unwrap_or_default();
        let total = buckets.iter().map(|b| u32::from(b.weight)).sum::<u32>().max(1);
        buckets
            .iter()
            .map(|b| (b.port, f64::from(b.weight) / f64::from(total)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Scales a share in `[0, 1]` to a bucket weight.
pub fn bucket_weight(share: f64) -> u16 {
    (share.clamp(0.0, 1.0) * BUCKET_WEIGHT_SCALE).round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_allocated_once_per_triple() {
        let (h1, s1, h2) = (NodeId::host(1), NodeId::switch(1), NodeId::host(2));
        let mut table = GroupTable::new();
        assert_eq!(table.allocate(h1, s1, h2), (GroupId::new(1), GroupCommand::Add));
        assert_eq!(table.allocate(h2, s1, h1), (GroupId::new(2), GroupCommand::Add));
        assert_eq!(table.allocate(h1, s1, h2), (GroupId::new(1), GroupCommand::Modify));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn shares_follow_bucket_weights() {
        let mut table = GroupTable::new();
        let g = GroupId::new(1);
        table.set_buckets(g, vec![Bucket::new(1, Port::new(1)), Bucket::new(3, Port::new(2))]);
        assert_eq!(table.shares(g), vec![(Port::new(1), 0.25), (Port::new(2), 0.75)]);
        assert!(table.shares(GroupId::new(9)).is_empty());
    }

    #[test]
    fn zero_weight_buckets_carry_nothing() {
        let mut table = GroupTable::new();
        let g = GroupId::new(1);
        table.set_buckets(g, vec![Bucket::new(0, Port::new(1)), Bucket::new(0, Port::new(2))]);
        assert!(table.shares(g).iter().all(|&(_, share)| share == 0.0));
    }

    #[test]
    fn bucket_weights_scale_and_clamp() {
        assert_eq!(bucket_weight(1.0), 65535);
        assert_eq!(bucket_weight(0.5), 32768);
        assert_eq!(bucket_weight(-0.2), 0);
        assert_eq!(bucket_weight(1.7), 65535);
    }
}
