use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("invalid node id length")]
    InvalidNodeId,

    #[error("bucket full")]
    BucketFull,

    #[error("split not allowed")]
    SplitNotAllowed,
}
