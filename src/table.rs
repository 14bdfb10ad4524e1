use crate::bucket::{Bucket, IdRange};
use crate::error::RoutingError;
use crate::id::{NodeId, ID_LEN};
use crate::node::RemoteNode;
use crate::sorter;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

/// Bucket capacity and closest-nodes result size (the Kademlia `k`).
pub const BUCKET_LEN: usize = 8;

/// Kademlia routing table: the peers a DHT node knows, partitioned into
/// buckets by identifier range.
///
/// The table starts as a single bucket covering the whole identifier space;
/// admitting peers near the local identifier splits that bucket as needed.
/// Reads and writes serialize on one table-wide lock, so a split can never
/// be observed half-done. Network I/O, timeouts, and retry policy belong to
/// the protocol layer, which reports its outcomes through the reachability
/// updates.
///
/// # Examples
///
/// ```
/// use kadroute::{NodeId, RoutingTable};
///
/// # fn example() -> Result<(), kadroute::RoutingError> {
/// let table = RoutingTable::new(NodeId::generate())?;
///
/// let addr = "203.0.113.7:6881".parse().unwrap();
/// let node = table.new_remote_node(&[0x4b; 20], Some(addr))?;
/// table.add_node(node)?;
///
/// let near = table.closest_nodes(&NodeId::generate());
/// assert!(near.len() <= table.bucket_len());
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct RoutingTable {
    local_id: [u8; ID_LEN],
    bucket_len: usize,
    buckets: RwLock<Vec<Bucket>>,
}

impl RoutingTable {
    pub fn new(local_id: NodeId) -> Result<Self, RoutingError> {
        Self::with_bucket_len(local_id, BUCKET_LEN)
    }

    /// Builds a table with a caller-chosen bucket capacity. The capacity is
    /// fixed for the table's lifetime.
    pub fn with_bucket_len(local_id: NodeId, bucket_len: usize) -> Result<Self, RoutingError> {
        let NodeId::Valid(local_id) = local_id else {
            return Err(RoutingError::InvalidNodeId);
        };
        Ok(Self {
            local_id,
            bucket_len,
            buckets: RwLock::new(vec![Bucket::new(IdRange::FULL)]),
        })
    }

    pub fn local_id(&self) -> NodeId {
        NodeId::Valid(self.local_id)
    }

    pub fn bucket_len(&self) -> usize {
        self.bucket_len
    }

    /// Validates `id` and builds a `RemoteNode` for it. The node is not
    /// admitted into the table; that is a separate step.
    pub fn new_remote_node(
        &self,
        id: &[u8],
        addr: Option<SocketAddr>,
    ) -> Result<RemoteNode, RoutingError> {
        let id = NodeId::from_bytes(id)?;
        Ok(RemoteNode::new(id, addr))
    }

    /// Admits `node` into the bucket owning its identifier.
    ///
    /// A node already present is refreshed in place. When the owning bucket
    /// is full it either evicts an unreachable entry, or, if it covers the
    /// local identifier, splits and re-routes. A full bucket that can do
    /// neither rejects the node with `BucketFull`.
    pub fn add_node(&self, node: RemoteNode) -> Result<(), RoutingError> {
        let NodeId::Valid(id) = node.id else {
            return Err(RoutingError::InvalidNodeId);
        };
        if id == self.local_id {
            return Ok(());
        }

        let mut buckets = self.buckets.write();
        loop {
            let idx = covering_index(&buckets, &id);

            if let Some(existing) = buckets[idx].get_mut(&node.id) {
                existing.addr = node.addr;
                existing.touch();
                return Ok(());
            }

            let bucket = &mut buckets[idx];
            if bucket.is_full(self.bucket_len)
                && !bucket.has_evictable()
                && bucket.range().contains(&self.local_id)
            {
                let upper = bucket.split(&self.local_id)?;
                debug!(
                    "split bucket {} into {:?} and {:?}",
                    idx,
                    bucket.range(),
                    upper.range()
                );
                buckets.insert(idx + 1, upper);
                continue;
            }

            return bucket.insert(node, self.bucket_len);
        }
    }

    /// Returns up to `bucket_len` reachable nodes nearest to `target`, in
    /// ascending distance order.
    ///
    /// Candidates come from the bucket covering `target`, widening to
    /// adjacent buckets until enough are gathered or the table is exhausted,
    /// then deduplicated by identifier and ranked. The same path serves a
    /// lone catch-all bucket and a fully split table.
    pub fn closest_nodes(&self, target: &NodeId) -> Vec<RemoteNode> {
        let buckets = self.buckets.read();
        let center = match target {
            NodeId::Valid(id) => covering_index(&buckets, id),
            NodeId::Invalid(_) => 0,
        };

        let mut candidates: Vec<&RemoteNode> = Vec::new();
        let mut seen: HashSet<[u8; ID_LEN]> = HashSet::new();
        gather(&buckets[center], &mut candidates, &mut seen);

        let (mut lo, mut hi) = (center, center);
        while candidates.len() < self.bucket_len && (lo > 0 || hi + 1 < buckets.len()) {
            if hi + 1 < buckets.len() {
                hi += 1;
                gather(&buckets[hi], &mut candidates, &mut seen);
            }
            if candidates.len() < self.bucket_len && lo > 0 {
                lo -= 1;
                gather(&buckets[lo], &mut candidates, &mut seen);
            }
        }

        sorter::closest(target, candidates, self.bucket_len)
    }

    pub fn mark_reachable(&self, id: &NodeId) {
        self.update_node(id, RemoteNode::mark_reachable);
    }

    pub fn mark_unreachable(&self, id: &NodeId) {
        self.update_node(id, RemoteNode::mark_unreachable);
    }

    /// Counts one failed query against the node; enough failures make it
    /// unreachable and therefore evictable under insertion pressure.
    pub fn record_failure(&self, id: &NodeId) {
        self.update_node(id, RemoteNode::record_failure);
    }

    pub fn find(&self, id: &NodeId) -> Option<RemoteNode> {
        let NodeId::Valid(bytes) = id else {
            return None;
        };
        let buckets = self.buckets.read();
        let idx = covering_index(&buckets, bytes);
        buckets[idx].get(id).cloned()
    }

    pub fn remove(&self, id: &NodeId) -> Option<RemoteNode> {
        let NodeId::Valid(bytes) = id else {
            return None;
        };
        let mut buckets = self.buckets.write();
        let idx = covering_index(&buckets, bytes);
        let removed = buckets[idx].remove(id);
        if removed.is_some() {
            debug!("removed node {} from bucket {}", id, idx);
        }
        removed
    }

    pub fn node_count(&self) -> usize {
        self.buckets.read().iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// A random lookup target inside each bucket that saw no change for
    /// `max_age`. Querying those targets refreshes the stale regions of the
    /// identifier space.
    pub fn refresh_targets(&self, max_age: Duration) -> Vec<NodeId> {
        let buckets = self.buckets.read();
        buckets
            .iter()
            .filter(|bucket| bucket.last_changed().elapsed() > max_age)
            .map(|bucket| bucket.range().random_id())
            .collect()
    }

    fn update_node(&self, id: &NodeId, apply: impl FnOnce(&mut RemoteNode)) {
        let NodeId::Valid(bytes) = id else {
            return;
        };
        let mut buckets = self.buckets.write();
        let idx = covering_index(&buckets, bytes);
        if let Some(node) = buckets[idx].get_mut(id) {
            apply(node);
        }
    }
}

#[cfg(test)]
impl RoutingTable {
    pub(crate) fn force_insert(&self, node: RemoteNode) {
        let NodeId::Valid(id) = node.id else {
            panic!("force_insert requires a valid id");
        };
        let mut buckets = self.buckets.write();
        let idx = covering_index(&buckets, &id);
        buckets[idx].force_push(node);
    }

    pub(crate) fn bucket_ranges(&self) -> Vec<IdRange> {
        self.buckets.read().iter().map(|b| *b.range()).collect()
    }
}

/// Index of the bucket whose range contains `id`. The buckets are ordered by
/// range and jointly cover the space, so the last bucket with `low <= id`
/// is the owner.
fn covering_index(buckets: &[Bucket], id: &[u8; ID_LEN]) -> usize {
    buckets
        .partition_point(|bucket| bucket.range().low <= *id)
        .saturating_sub(1)
}

fn gather<'a>(
    bucket: &'a Bucket,
    candidates: &mut Vec<&'a RemoteNode>,
    seen: &mut HashSet<[u8; ID_LEN]>,
) {
    for node in bucket.iter() {
        if !node.is_reachable() {
            continue;
        }
        if let NodeId::Valid(id) = &node.id {
            if seen.insert(*id) {
                candidates.push(node);
            }
        }
    }
}
