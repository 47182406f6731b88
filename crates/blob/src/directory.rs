//! Blob directory: the root of a chunked blob.
//!
//! A `Refs` node with the context flag set, whose children are leaf blobs in
//! logical byte order:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!  root ───▶ │ Refs, context_flag = chunked │
//!            │ [child0, child1, ..., childN]│
//!            └───┬─────────┬───────────┬────┘
//!                ▼         ▼           ▼
//!             [CAP B]   [CAP B]  ...  [1..=CAP B]
//!             0..CAP    CAP..2CAP     last, may be short
//! ```
//!
//! Every child but the last is exactly `CAP` bytes, so the child holding a
//! logical offset is found with a prefix sum over child lengths. The child
//! list is append-only.

use node::{NodeKind, NodeStore, Ref};
use tracing::trace;

use crate::{check_capacity, BlobError, Layout, LeafBlob, ParentSlot, Segment};

/// Stateless view over a directory node. Constructed per call from the root
/// reference, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobDirectory<const CAP: usize> {
    node: Ref,
}

impl<const CAP: usize> BlobDirectory<CAP> {
    /// Allocates an empty directory node tagged as chunked.
    pub fn create(store: &mut NodeStore) -> Result<Self, BlobError> {
        check_capacity::<CAP>();
        let node = store.alloc(NodeKind::Refs, true)?;
        Ok(Self { node })
    }

    #[must_use]
    pub const fn from_ref(node: Ref) -> Self {
        check_capacity::<CAP>();
        Self { node }
    }

    #[must_use]
    pub const fn node(&self) -> Ref {
        self.node
    }

    pub fn child_count(&self, store: &NodeStore) -> Result<usize, BlobError> {
        Ok(store.child_count(self.node)?)
    }

    pub fn child(&self, store: &NodeStore, index: usize) -> Result<LeafBlob<CAP>, BlobError> {
        Ok(LeafBlob::from_ref(store.child_ref(self.node, index)?))
    }

    /// Sum of the children's declared lengths. Visits every child header;
    /// no total is cached because children are mutated independently.
    pub fn logical_size(&self, store: &NodeStore) -> Result<usize, BlobError> {
        let mut total = 0;
        for index in 0..self.child_count(store)? {
            total += self.child(store, index)?.len(store)?;
        }
        Ok(total)
    }

    /// Returns the remainder of the physical child containing `pos`.
    ///
    /// `next_pos` is the logical offset right after the returned segment, or
    /// `0` if the segment comes from the last child. A `pos` at or past the
    /// end yields an empty segment with `next_pos == 0`.
    pub fn read_at<'s>(&self, store: &'s NodeStore, pos: usize) -> Result<Segment<'s>, BlobError> {
        let count = self.child_count(store)?;
        let mut offset = pos;

        for index in 0..count {
            let child = self.child(store, index)?;
            let len = child.len(store)?;
            if offset < len {
                let data = child.read(store, offset)?;
                let next_pos = if index + 1 == count {
                    0
                } else {
                    pos + data.len()
                };
                return Ok(Segment { data, next_pos });
            }
            offset -= len;
        }

        Ok(Segment::empty())
    }

    /// Appends `data`, topping up the last child before creating new ones.
    ///
    /// Returns the directory reference, which differs from the one the view
    /// was built from only if the directory had to be copied for writing.
    ///
    /// If the store runs out of space midway, the bytes appended so far stay
    /// in place and the directory invariant still holds.
    pub fn append(&mut self, store: &mut NodeStore, data: &[u8]) -> Result<Ref, BlobError> {
        if data.is_empty() {
            return Ok(self.node);
        }
        self.node = store.duplicate_for_write(self.node)?;

        let mut rest = data;
        let count = self.child_count(store)?;
        if count > 0 {
            let index = count - 1;
            let mut last = self.child(store, index)?;
            let space_left = CAP.saturating_sub(last.len(store)?);
            let n = space_left.min(rest.len());
            if n > 0 {
                let slot = ParentSlot::Child {
                    parent: self.node,
                    index,
                };
                last.append_within_capacity(store, slot, &rest[..n])?;
            }
            rest = &rest[n..];
        }

        while !rest.is_empty() {
            let n = CAP.min(rest.len());
            self.push_leaf(store, &rest[..n])?;
            rest = &rest[n..];
        }

        Ok(self.node)
    }

    /// Creates a leaf holding `chunk` and appends its reference. On failure
    /// the new leaf is released again.
    fn push_leaf(&mut self, store: &mut NodeStore, chunk: &[u8]) -> Result<(), BlobError> {
        let mut leaf = LeafBlob::<CAP>::create(store)?;
        let linked = leaf
            .append_within_capacity(store, ParentSlot::Detached, chunk)
            .and_then(|child| Ok(store.append_child_ref(self.node, child)?));
        if let Err(e) = linked {
            let _ = store.free(leaf.node());
            return Err(e);
        }
        trace!(directory = %self.node, leaf = %leaf.node(), len = chunk.len(), "appended leaf");
        Ok(())
    }

    /// Checks the directory node and, recursively, every child.
    ///
    /// Besides the node shape this enforces the capacity invariant: every
    /// child but the last holds exactly `CAP` bytes, the last holds
    /// `1..=CAP`.
    pub fn verify(&self, store: &NodeStore) -> Result<(), BlobError> {
        let header = store.header(self.node)?;
        if !header.kind.has_refs() {
            return Err(BlobError::corrupt(self.node, "directory carries no child references"));
        }
        if !header.context_flag {
            return Err(BlobError::corrupt(self.node, "directory is not flagged as chunked"));
        }
        let count = header.size;
        if count == 0 {
            return Err(BlobError::corrupt(self.node, "directory has no children"));
        }

        for index in 0..count {
            let child = store.child_ref(self.node, index)?;
            if child.is_null() {
                return Err(BlobError::corrupt(self.node, format!("child {} is null", index)));
            }
            let len = match Layout::<CAP>::resolve(store, child)? {
                Layout::Flat(leaf) => {
                    leaf.verify(store)?;
                    leaf.len(store)?
                }
                Layout::Chunked(nested) => {
                    nested.verify(store)?;
                    return Err(BlobError::corrupt(
                        self.node,
                        format!("child {} is a nested directory", index),
                    ));
                }
            };

            let last = index + 1 == count;
            if !last && len != CAP {
                return Err(BlobError::corrupt(
                    self.node,
                    format!("child {} holds {} bytes, expected {}", index, len, CAP),
                ));
            }
            if last && len == 0 {
                return Err(BlobError::corrupt(self.node, "last child is empty"));
            }
        }
        Ok(())
    }
}
