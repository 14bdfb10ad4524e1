//! kadroute - Kademlia routing table
//!
//! This library implements the routing-table core of a mainline-style
//! (BitTorrent) DHT node: 20-byte node identifiers compared by XOR distance,
//! range-partitioned buckets that split around the local identifier, and the
//! closest-nodes query that drives lookup routing.
//!
//! The surrounding protocol layer owns sockets, message encoding, timeouts,
//! and retries; it feeds this crate peers it hears about and reports query
//! outcomes through the reachability updates.

mod bucket;
mod error;
mod id;
mod node;
mod sorter;
mod table;

pub use error::RoutingError;
pub use id::{Distance, NodeId, ID_LEN};
pub use node::{Reachability, RemoteNode};
pub use sorter::{closest, sort_by_distance};
pub use table::{RoutingTable, BUCKET_LEN};
