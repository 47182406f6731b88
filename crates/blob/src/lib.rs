//! # Blob - Variable-Length Binary Values
//!
//! Stores byte sequences of any length on top of the fixed-capacity nodes of
//! a [`node::NodeStore`].
//!
//! ## Modes
//!
//! ```text
//! FLAT                               CHUNKED
//! ┌──────────────────────┐           ┌──────────────────────────┐
//! │ Bytes node           │  promote  │ Refs node (context flag) │
//! │ 0..=CAP bytes        │ ────────▶ │ child0 = old flat node   │
//! │ any range replace    │  (once)   │ child1.. new leaves      │
//! └──────────────────────┘           │ append only              │
//!                                    └──────────────────────────┘
//! ```
//!
//! The mode lives in the root node's context flag and is read on every
//! call. A blob starts flat. The first mutation that would leave it with
//! more than `CAP` bytes promotes it: a new directory root is allocated, the
//! existing flat node becomes its first child by reference, and the payload
//! is appended to the directory. Chunked blobs are never demoted.
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                              |
//! |-----------------|------------------------------------------------------|
//! | [`lib.rs`]      | `Blob` facade, `Mode`, `Layout`, `Segment`, `verify`  |
//! | [`leaf`]        | `LeafBlob`: flat storage and range replace           |
//! | [`directory`]   | `BlobDirectory`: chunked read and append             |
//! | [`read`]        | `read_at`, `read_range`, segments, `io::Read` adapter |
//! | [`write`]       | `replace`, promotion, append/insert/erase helpers     |
//! | [`array`]       | `BinaryArray`: nullable byte strings over one blob   |
//!
//! ## Reading
//!
//! [`Blob::read_at`] returns one physical segment per call together with the
//! position of the next one (`0` when there is none):
//!
//! ```rust
//! use blob::Blob;
//! use node::NodeStore;
//!
//! let mut store = NodeStore::new();
//! let blob = Blob::<4>::create_from(&mut store, b"hello world").unwrap();
//!
//! let mut pos = 0;
//! let mut out = Vec::new();
//! loop {
//!     let seg = blob.read_at(&store, pos).unwrap();
//!     out.extend_from_slice(seg.data);
//!     if seg.next_pos == 0 {
//!         break;
//!     }
//!     pos = seg.next_pos;
//! }
//! assert_eq!(out, b"hello world");
//! ```

mod array;
mod directory;
mod error;
mod leaf;
mod read;
mod slot;
mod write;

pub use array::BinaryArray;
pub use directory::BlobDirectory;
pub use error::BlobError;
pub use leaf::LeafBlob;
pub use read::{BlobReader, Segments};
pub use slot::ParentSlot;

use node::{NodeStore, Ref, HEADER_BYTES};

/// Maximum number of bytes a single leaf node holds. Part of the storage
/// format: every node of a store must be produced with the same value.
pub const MAX_LEAF_CAPACITY: usize = 0xFF_FFF8 - HEADER_BYTES;

/// Storage mode of a blob, persisted as the root node's context flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// All bytes in the root node.
    Flat,
    /// The root is a directory of leaf nodes.
    Chunked,
}

impl Mode {
    /// Reads the mode of the node `r`.
    pub fn of(store: &NodeStore, r: Ref) -> Result<Mode, BlobError> {
        Ok(if store.context_flag(r)? {
            Mode::Chunked
        } else {
            Mode::Flat
        })
    }
}

/// The view matching a root node's persisted mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout<const CAP: usize> {
    Flat(LeafBlob<CAP>),
    Chunked(BlobDirectory<CAP>),
}

impl<const CAP: usize> Layout<CAP> {
    pub fn resolve(store: &NodeStore, root: Ref) -> Result<Self, BlobError> {
        Ok(match Mode::of(store, root)? {
            Mode::Flat => Layout::Flat(LeafBlob::from_ref(root)),
            Mode::Chunked => Layout::Chunked(BlobDirectory::from_ref(root)),
        })
    }
}

/// One physical segment returned by a positional read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'s> {
    /// Bytes from the requested position to the end of the physical node.
    pub data: &'s [u8],
    /// Logical position of the next segment, `0` if this is the last one.
    pub next_pos: usize,
}

impl<'s> Segment<'s> {
    /// The empty, final segment.
    #[must_use]
    pub const fn empty() -> Self {
        Segment {
            data: &[],
            next_pos: 0,
        }
    }

    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.next_pos == 0
    }
}

struct Capacity<const CAP: usize>;

impl<const CAP: usize> Capacity<CAP> {
    const VALID: () = assert!(
        CAP > 0 && CAP <= node::MAX_NODE_ELEMENTS,
        "leaf capacity must fit in a node"
    );
}

/// Fails to compile for a `CAP` that is zero or does not fit the node size
/// field. Every view constructor calls it.
pub(crate) const fn check_capacity<const CAP: usize>() {
    Capacity::<CAP>::VALID
}

/// Handle to a blob stored in a [`NodeStore`].
///
/// The handle is only the root reference. All operations take the store
/// explicitly: `&NodeStore` for reads, `&mut NodeStore` for mutations.
/// Mutations return the root reference, which changes on promotion and when
/// copy-on-write relocates a committed root; the caller must store it
/// wherever the old one was kept.
///
/// `CAP` is the leaf capacity, [`MAX_LEAF_CAPACITY`] unless a test or a
/// special-purpose store picks a smaller one. A capacity of zero is rejected
/// at compile time:
///
/// ```compile_fail
/// let blob = blob::Blob::<0>::from_ref(node::Ref::NULL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob<const CAP: usize = MAX_LEAF_CAPACITY> {
    root: Ref,
}

impl<const CAP: usize> Blob<CAP> {
    /// Creates an empty flat blob.
    pub fn create(store: &mut NodeStore) -> Result<Self, BlobError> {
        let leaf = LeafBlob::<CAP>::create(store)?;
        Ok(Self { root: leaf.node() })
    }

    /// Creates a blob holding `data`, chunked if it does not fit one leaf.
    pub fn create_from(store: &mut NodeStore, data: &[u8]) -> Result<Self, BlobError> {
        let mut blob = Self::create(store)?;
        if let Err(e) = blob.append(store, data, false) {
            let _ = store.destroy_deep(blob.root);
            return Err(e);
        }
        Ok(blob)
    }

    /// Wraps an existing root reference.
    #[must_use]
    pub const fn from_ref(root: Ref) -> Self {
        check_capacity::<CAP>();
        Self { root }
    }

    #[must_use]
    pub const fn root(&self) -> Ref {
        self.root
    }

    pub fn mode(&self, store: &NodeStore) -> Result<Mode, BlobError> {
        Mode::of(store, self.root)
    }

    /// Structural check of the whole blob. Returns [`BlobError::Corrupt`]
    /// naming the first offending node.
    pub fn verify(&self, store: &NodeStore) -> Result<(), BlobError> {
        match Layout::<CAP>::resolve(store, self.root)? {
            Layout::Flat(leaf) => leaf.verify(store),
            Layout::Chunked(dir) => dir.verify(store),
        }
    }
}

#[cfg(test)]
mod tests;
