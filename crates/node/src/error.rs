use std::io;

use thiserror::Error;

use crate::{NodeKind, Ref};

/// Errors that can occur during node store operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The null reference was dereferenced.
    #[error("null reference")]
    NullRef,

    /// The reference does not point at a live node.
    #[error("dangling reference {0}")]
    Dangling(Ref),

    /// In-place mutation of a frozen node. Use `duplicate_for_write` first.
    #[error("node {0} is read-only")]
    ReadOnly(Ref),

    /// The operation requires a different payload kind.
    #[error("node {node} is not a {expected:?} node")]
    KindMismatch { node: Ref, expected: NodeKind },

    /// `resize` was called with an element width that does not match the node.
    #[error("node {node} has element width {actual}, not {requested}")]
    WidthMismatch {
        node: Ref,
        actual: usize,
        requested: usize,
    },

    /// Child index past the end of a `Refs` node.
    #[error("child index {index} out of bounds for node {node} with {count} children")]
    ChildIndex { node: Ref, index: usize, count: usize },

    /// The requested size does not fit in a node header.
    #[error("node {node}: size {size} exceeds header limit")]
    TooLarge { node: Ref, size: usize },

    /// The store's byte budget cannot satisfy an allocation.
    #[error("out of space: requested {requested} bytes, {available} available")]
    OutOfSpace { requested: usize, available: usize },

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot file failed validation.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}
