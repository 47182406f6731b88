//! # Node - Copy-on-Write Node Store
//!
//! The storage substrate every higher-level structure is built from. A node
//! is a small header plus a homogeneous payload of fixed-width elements,
//! addressed by a [`Ref`]. Nodes are individually allocated, resized and
//! freed; they never move unless copy-on-write relocates them.
//!
//! ## Node Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ HEADER (NodeHeader)                          │
//! │   kind          Bytes (w=1) | Refs (w=8)     │
//! │   context_flag  one free bit for the owner   │
//! │   size          element count (24 bits)      │
//! ├──────────────────────────────────────────────┤
//! │ PAYLOAD  size * width bytes                  │
//! │   Bytes: raw bytes                           │
//! │   Refs:  child references, u64 LE each       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Generations
//!
//! [`NodeStore::commit`] freezes every node allocated so far. Frozen nodes
//! are read-only: the mutating accessors reject them and callers must go
//! through [`NodeStore::duplicate_for_write`], which returns a writable copy.
//! The frozen original keeps serving any reference captured before the
//! mutation.
//!
//! ```text
//! refs 1..=baseline           refs > baseline
//! ┌────────────────────┐      ┌────────────────────┐
//! │ read-only (frozen) │ ───▶ │ writable           │
//! └────────────────────┘ COW  └────────────────────┘
//! ```
//!
//! ## Snapshot File
//!
//! [`NodeStore::save`] writes every node reachable from a top reference to a
//! checksummed snapshot file, [`NodeStore::open`] loads it back as a frozen
//! generation. See [`snapshot`] for the layout.
//!
//! ## Example
//!
//! ```rust
//! use node::{NodeKind, NodeStore};
//!
//! let mut store = NodeStore::new();
//! let r = store.alloc(NodeKind::Bytes, false).unwrap();
//! store.resize(r, 5, 1).unwrap();
//! store.bytes_mut(r).unwrap().copy_from_slice(b"hello");
//! assert_eq!(store.bytes(r).unwrap(), b"hello");
//! ```

use std::fmt;

mod error;
pub mod snapshot;
mod store;

pub use error::NodeError;
pub use snapshot::{FOOTER_BYTES, SNAPSHOT_MAGIC};
pub use store::NodeStore;

/// Size of the on-disk node header in bytes. Counted against the store's
/// byte budget for every live node.
pub const HEADER_BYTES: usize = 8;

/// Largest element count a node header can record (24-bit size field).
pub const MAX_NODE_ELEMENTS: usize = 0xFF_FFFF;

/// A reference to a node. `0` is the null reference.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ref(u64);

impl Ref {
    /// The null reference.
    pub const NULL: Ref = Ref(0);

    /// Wraps a raw reference value as stored in a `Refs` payload.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Ref(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({:#x})", self.0)
    }
}

/// What a node's payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Raw bytes, element width 1.
    Bytes,
    /// Child references, element width 8 (`u64` little-endian).
    Refs,
}

impl NodeKind {
    /// Width of one payload element in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            NodeKind::Bytes => 1,
            NodeKind::Refs => 8,
        }
    }

    /// Returns `true` if the payload holds child references.
    #[must_use]
    pub const fn has_refs(self) -> bool {
        matches!(self, NodeKind::Refs)
    }

    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            NodeKind::Bytes => 0,
            NodeKind::Refs => 1,
        }
    }

    pub(crate) const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(NodeKind::Bytes),
            1 => Some(NodeKind::Refs),
            _ => None,
        }
    }
}

/// Node header as recorded by the store, independent of the payload buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub kind: NodeKind,
    /// Owner-defined flag bit. The blob layer uses it for the chunked mode.
    pub context_flag: bool,
    /// Element count (the declared length).
    pub size: usize,
}
