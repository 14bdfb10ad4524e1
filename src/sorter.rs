//! Ranks candidate nodes by XOR distance to a pivot identifier.

use crate::id::{Distance, NodeId};
use crate::node::RemoteNode;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Reorders `nodes` by ascending distance to `pivot`.
///
/// The sort is stable: entries at equal distance keep their input order.
/// Entries whose identifier is malformed all compare at `Distance::Infinite`
/// and end up after every well-formed entry.
pub fn sort_by_distance(pivot: &NodeId, nodes: &mut [RemoteNode]) {
    nodes.sort_by_cached_key(|n| pivot.distance(&n.id));
}

struct Entry<'a> {
    dist: Distance,
    seq: usize,
    node: &'a RemoteNode,
}

impl Ord for Entry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.dist, self.seq).cmp(&(other.dist, other.seq))
    }
}

impl PartialOrd for Entry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry<'_> {}

/// Selects the `k` candidates nearest to `pivot`, in ascending distance
/// order, without sorting the whole candidate set.
///
/// A bounded max-heap keeps the selection at O(n log k); ties resolve toward
/// the earlier candidate, so the result agrees with [`sort_by_distance`].
pub fn closest<'a, I>(pivot: &NodeId, candidates: I, k: usize) -> Vec<RemoteNode>
where
    I: IntoIterator<Item = &'a RemoteNode>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Entry<'_>> = BinaryHeap::with_capacity(k + 1);
    for (seq, node) in candidates.into_iter().enumerate() {
        let dist = pivot.distance(&node.id);
        if heap.len() < k {
            heap.push(Entry { dist, seq, node });
        } else if let Some(worst) = heap.peek() {
            if (dist, seq) < (worst.dist, worst.seq) {
                heap.push(Entry { dist, seq, node });
                heap.pop();
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|entry| entry.node.clone())
        .collect()
}
