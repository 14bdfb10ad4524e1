use crate::error::RoutingError;
use bytes::Bytes;
use rand::Rng as _;
use std::fmt;

/// Length in bytes of a well-formed node identifier (SHA-1 sized).
pub const ID_LEN: usize = 20;

/// A node identifier as received from the network.
///
/// Identifiers of the wrong length still circulate in candidate sets, so the
/// type keeps them representable instead of rejecting them at comparison
/// time. Only `Valid` identifiers can be admitted into the routing table;
/// `Invalid` ones sort after every valid one in distance order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    Valid([u8; ID_LEN]),
    Invalid(Bytes),
}

impl NodeId {
    pub fn generate() -> Self {
        let mut id = [0u8; ID_LEN];
        rand::rng().fill(&mut id);
        Self::Valid(id)
    }

    /// Validating constructor. Fails unless `bytes` is exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RoutingError> {
        if bytes.len() != ID_LEN {
            return Err(RoutingError::InvalidNodeId);
        }
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(bytes);
        Ok(Self::Valid(id))
    }

    /// Total constructor: wrong-length input becomes an `Invalid` identifier
    /// rather than an error.
    pub fn from_raw(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        match Self::from_bytes(bytes) {
            Ok(id) => id,
            Err(_) => Self::Invalid(Bytes::copy_from_slice(bytes)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            NodeId::Valid(id) => id,
            NodeId::Invalid(raw) => raw,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, NodeId::Valid(_))
    }

    /// XOR distance to `other`. Total: any pairing that involves an
    /// `Invalid` identifier is `Distance::Infinite`.
    pub fn distance(&self, other: &NodeId) -> Distance {
        match (self, other) {
            (NodeId::Valid(a), NodeId::Valid(b)) => {
                let mut xor = [0u8; ID_LEN];
                for (i, d) in xor.iter_mut().enumerate() {
                    *d = a[i] ^ b[i];
                }
                Distance::Xor(xor)
            }
            _ => Distance::Infinite,
        }
    }
}

impl From<[u8; ID_LEN]> for NodeId {
    fn from(id: [u8; ID_LEN]) -> Self {
        NodeId::Valid(id)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Valid(id) => write!(f, "NodeId({:02x}{:02x}..)", id[0], id[1]),
            NodeId::Invalid(raw) => write!(f, "NodeId(invalid, {} bytes)", raw.len()),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// XOR distance between two identifiers, ordered as a big-endian unsigned
/// integer. `Infinite` is greater than every `Xor` value, so entries with
/// malformed identifiers rank after all well-formed ones.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Distance {
    Xor([u8; ID_LEN]),
    Infinite,
}

impl Distance {
    pub const ZERO: Distance = Distance::Xor([0; ID_LEN]);
}
