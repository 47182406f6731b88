use node::{NodeError, Ref};
use thiserror::Error;

/// Errors returned by blob operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Failure in the node store (allocation, dangling reference, ...).
    #[error(transparent)]
    Node(#[from] NodeError),

    /// `begin..end` (or a read offset) does not fit the blob.
    #[error("range {begin}..{end} out of bounds for length {len}")]
    RangeOutOfBounds { begin: usize, end: usize, len: usize },

    /// An element index past the end of a [`BinaryArray`](crate::BinaryArray).
    #[error("index {index} out of bounds for {len} entries")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A mutation the current mode cannot express. Chunked blobs only grow
    /// by appending.
    #[error("unsupported mutation {begin}..{end}: chunked blobs are append-only")]
    UnsupportedMutation { begin: usize, end: usize },

    /// A leaf mutation would grow the node past its capacity.
    #[error("leaf capacity exceeded: {required} bytes needed, capacity is {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },

    /// Structural check failed.
    #[error("corrupt blob node {node}: {reason}")]
    Corrupt { node: Ref, reason: String },
}

impl BlobError {
    pub(crate) fn corrupt(node: Ref, reason: impl Into<String>) -> Self {
        BlobError::Corrupt {
            node,
            reason: reason.into(),
        }
    }
}
