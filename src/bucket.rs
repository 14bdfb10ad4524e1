use crate::error::RoutingError;
use crate::id::{NodeId, ID_LEN};
use crate::node::RemoteNode;
use rand::Rng as _;
use std::time::Instant;

const ONE: [u8; ID_LEN] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];

/// Half-open identifier range `[low, high)`. `high` of `None` marks the end
/// of the 160-bit space, which has no 20-byte representation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IdRange {
    pub low: [u8; ID_LEN],
    pub high: Option<[u8; ID_LEN]>,
}

impl IdRange {
    pub const FULL: IdRange = IdRange {
        low: [0; ID_LEN],
        high: None,
    };

    pub fn contains(&self, id: &[u8; ID_LEN]) -> bool {
        *id >= self.low && self.high.is_none_or(|high| *id < high)
    }

    /// `(low + high) / 2`, with the end-of-space bound acting as 2^160.
    fn midpoint(&self) -> [u8; ID_LEN] {
        match self.high {
            Some(high) => {
                let (sum, carry) = overflowing_add(self.low, &high);
                half(sum, carry)
            }
            None => half(self.low, true),
        }
    }

    /// A uniformly chosen identifier inside the range, used as the lookup
    /// target when refreshing a stale bucket.
    pub fn random_id(&self) -> NodeId {
        // 2^160 and 0 coincide modulo 2^160, so the span math below holds
        // for the end-of-space bound as well.
        let high = self.high.unwrap_or([0; ID_LEN]);
        let span = wrapping_sub(wrapping_sub(high, &self.low), &ONE);
        let offset = random_up_to(&span);
        let (id, _) = overflowing_add(self.low, &offset);
        NodeId::Valid(id)
    }
}

/// Bounded container for the peers whose identifiers fall in its range.
#[derive(Debug)]
pub struct Bucket {
    range: IdRange,
    nodes: Vec<RemoteNode>,
    last_changed: Instant,
}

impl Bucket {
    pub fn new(range: IdRange) -> Self {
        Self {
            range,
            nodes: Vec::new(),
            last_changed: Instant::now(),
        }
    }

    pub fn range(&self) -> &IdRange {
        &self.range
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_full(&self, cap: usize) -> bool {
        self.nodes.len() >= cap
    }

    pub fn has_evictable(&self) -> bool {
        self.nodes.iter().any(RemoteNode::is_evictable)
    }

    pub fn last_changed(&self) -> Instant {
        self.last_changed
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteNode> {
        self.nodes.iter()
    }

    pub fn get(&self, id: &NodeId) -> Option<&RemoteNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut RemoteNode> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    /// Adds `node`, overwriting an evictable entry when at capacity.
    pub fn insert(&mut self, node: RemoteNode, cap: usize) -> Result<(), RoutingError> {
        debug_assert!(matches!(&node.id, NodeId::Valid(id) if self.range.contains(id)));

        if self.nodes.len() < cap {
            self.nodes.push(node);
            self.last_changed = Instant::now();
            return Ok(());
        }

        match self.nodes.iter().position(RemoteNode::is_evictable) {
            Some(pos) => {
                self.nodes[pos] = node;
                self.last_changed = Instant::now();
                Ok(())
            }
            None => Err(RoutingError::BucketFull),
        }
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<RemoteNode> {
        let pos = self.nodes.iter().position(|n| &n.id == id)?;
        self.last_changed = Instant::now();
        Some(self.nodes.remove(pos))
    }

    /// Splits the range at its midpoint. `self` keeps `[low, mid)` and the
    /// returned bucket owns `[mid, high)`; members move to whichever half
    /// contains their identifier, keeping their insertion order.
    ///
    /// Only the bucket whose range contains the local node's identifier may
    /// split, and a range of a single identifier cannot.
    pub fn split(&mut self, local_id: &[u8; ID_LEN]) -> Result<Bucket, RoutingError> {
        if !self.range.contains(local_id) {
            return Err(RoutingError::SplitNotAllowed);
        }
        let mid = self.range.midpoint();
        if mid == self.range.low {
            return Err(RoutingError::SplitNotAllowed);
        }

        let upper_range = IdRange {
            low: mid,
            high: self.range.high,
        };
        self.range.high = Some(mid);

        let nodes = std::mem::take(&mut self.nodes);
        let (lower, upper): (Vec<_>, Vec<_>) = nodes
            .into_iter()
            .partition(|n| matches!(&n.id, NodeId::Valid(id) if self.range.contains(id)));
        self.nodes = lower;
        self.last_changed = Instant::now();

        Ok(Bucket {
            range: upper_range,
            nodes: upper,
            last_changed: Instant::now(),
        })
    }

    #[cfg(test)]
    pub fn force_push(&mut self, node: RemoteNode) {
        self.nodes.push(node);
    }
}

fn overflowing_add(mut value: [u8; ID_LEN], other: &[u8; ID_LEN]) -> ([u8; ID_LEN], bool) {
    let mut carry = 0u8;
    for i in (0..ID_LEN).rev() {
        let (sum, overflow_a) = value[i].overflowing_add(other[i]);
        let (sum, overflow_b) = sum.overflowing_add(carry);
        value[i] = sum;
        carry = u8::from(overflow_a || overflow_b);
    }
    (value, carry == 1)
}

fn wrapping_sub(mut value: [u8; ID_LEN], other: &[u8; ID_LEN]) -> [u8; ID_LEN] {
    let mut borrow = 0u8;
    for i in (0..ID_LEN).rev() {
        let (diff, underflow_a) = value[i].overflowing_sub(other[i]);
        let (diff, underflow_b) = diff.overflowing_sub(borrow);
        value[i] = diff;
        borrow = u8::from(underflow_a || underflow_b);
    }
    value
}

fn half(mut value: [u8; ID_LEN], carry_in: bool) -> [u8; ID_LEN] {
    let mut carry = carry_in;
    for byte in value.iter_mut() {
        let low_bit = *byte & 1 == 1;
        *byte >>= 1;
        if carry {
            *byte |= 0x80;
        }
        carry = low_bit;
    }
    value
}

/// Uniform-ish random value in `[0, end]`, byte by byte.
fn random_up_to(end: &[u8; ID_LEN]) -> [u8; ID_LEN] {
    let mut rng = rand::rng();
    let mut out = [0u8; ID_LEN];
    let mut capped = true;
    for (i, byte) in out.iter_mut().enumerate() {
        if capped {
            *byte = rng.random_range(0..=end[i]);
            capped = *byte == end[i];
        } else {
            *byte = rng.random();
        }
    }
    out
}
