//! Leaf blob: up to `CAP` bytes stored contiguously in one `Bytes` node.

use node::{NodeError, NodeKind, NodeStore, Ref};

use crate::{check_capacity, BlobError, ParentSlot};

/// Length of a blob of `len` bytes after replacing `begin..end` with
/// `data_len` bytes, plus one if a zero terminator is appended.
pub(crate) fn replaced_length(
    len: usize,
    begin: usize,
    end: usize,
    data_len: usize,
    add_zero_terminator: bool,
) -> usize {
    len - (end - begin) + data_len + usize::from(add_zero_terminator)
}

/// Stateless view over a single leaf node.
///
/// Holds nothing but the reference; every call resolves it against the
/// store. Mutations that relocate the node (copy-on-write) update the view
/// and write the new reference through a [`ParentSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafBlob<const CAP: usize> {
    node: Ref,
}

impl<const CAP: usize> LeafBlob<CAP> {
    /// Allocates an empty leaf.
    pub fn create(store: &mut NodeStore) -> Result<Self, BlobError> {
        check_capacity::<CAP>();
        let node = store.alloc(NodeKind::Bytes, false)?;
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

    pub fn len(&self, store: &NodeStore) -> Result<usize, BlobError> {
        Ok(store.declared_length(self.node)?)
    }

    pub fn is_empty(&self, store: &NodeStore) -> Result<bool, BlobError> {
        Ok(self.len(store)? == 0)
    }

    /// Bytes `offset..len`. The slice borrows the store, so it is only valid
    /// until the next mutation.
    pub fn read<'s>(&self, store: &'s NodeStore, offset: usize) -> Result<&'s [u8], BlobError> {
        let bytes = store.bytes(self.node)?;
        if offset > bytes.len() {
            return Err(BlobError::RangeOutOfBounds {
                begin: offset,
                end: offset,
                len: bytes.len(),
            });
        }
        Ok(&bytes[offset..])
    }

    /// Replaces bytes `begin..end` with `data`, optionally followed by a zero
    /// byte. Returns the (possibly relocated) node reference.
    ///
    /// # Errors
    ///
    /// - [`BlobError::RangeOutOfBounds`] unless `begin <= end <= len`.
    /// - [`BlobError::CapacityExceeded`] if the result would hold more than
    ///   `CAP` bytes. The leaf never splits itself; promotion is the
    ///   caller's decision.
    /// - [`BlobError::Node`] if the store cannot copy or grow the node. The
    ///   leaf is left as it was.
    pub fn replace(
        &mut self,
        store: &mut NodeStore,
        slot: ParentSlot,
        begin: usize,
        end: usize,
        data: &[u8],
        add_zero_terminator: bool,
    ) -> Result<Ref, BlobError> {
        let len = self.len(store)?;
        if begin > end || end > len {
            return Err(BlobError::RangeOutOfBounds { begin, end, len });
        }
        let new_len = replaced_length(len, begin, end, data.len(), add_zero_terminator);
        if new_len > CAP {
            return Err(BlobError::CapacityExceeded {
                required: new_len,
                capacity: CAP,
            });
        }

        let node = store.duplicate_for_write(self.node)?;
        let relocated = node != self.node;
        let spliced = splice(store, node, len, new_len, begin, end, data, add_zero_terminator)
            .and_then(|()| if relocated { slot.write_back(store, node) } else { Ok(()) });
        if let Err(e) = spliced {
            if relocated {
                let _ = store.free(node);
            }
            return Err(e.into());
        }

        self.node = node;
        Ok(node)
    }

    /// Appends `data` at the end. The result must fit in `CAP` bytes.
    pub fn append_within_capacity(
        &mut self,
        store: &mut NodeStore,
        slot: ParentSlot,
        data: &[u8],
    ) -> Result<Ref, BlobError> {
        let len = self.len(store)?;
        self.replace(store, slot, len, len, data, false)
    }

    /// Checks that the node is a pure byte leaf in flat mode whose declared
    /// length matches its payload and fits the capacity.
    pub fn verify(&self, store: &NodeStore) -> Result<(), BlobError> {
        let header = store.header(self.node)?;
        if header.kind.has_refs() {
            return Err(BlobError::corrupt(self.node, "leaf carries child references"));
        }
        if header.context_flag {
            return Err(BlobError::corrupt(self.node, "leaf is flagged as chunked"));
        }
        if header.size > CAP {
            return Err(BlobError::corrupt(
                self.node,
                format!("leaf length {} exceeds capacity {}", header.size, CAP),
            ));
        }
        let payload = store.payload_len(self.node)?;
        if payload != header.size {
            return Err(BlobError::corrupt(
                self.node,
                format!(
                    "declared length {} does not match stored payload of {} bytes",
                    header.size, payload
                ),
            ));
        }
        Ok(())
    }
}

/// Rewrites a writable node in place: moves the tail `end..old_len` to its
/// new position, then writes `data` (and the terminator) into the gap.
#[allow(clippy::too_many_arguments)]
fn splice(
    store: &mut NodeStore,
    node: Ref,
    old_len: usize,
    new_len: usize,
    begin: usize,
    end: usize,
    data: &[u8],
    add_zero_terminator: bool,
) -> Result<(), NodeError> {
    let add = data.len() + usize::from(add_zero_terminator);

    // Grow before shifting right, shrink after shifting left.
    if new_len > old_len {
        store.resize(node, new_len, 1)?;
    }

    let bytes = store.bytes_mut(node)?;
    if add != end - begin {
        bytes.copy_within(end..old_len, begin + add);
    }
    bytes[begin..begin + data.len()].copy_from_slice(data);
    if add_zero_terminator {
        bytes[begin + data.len()] = 0;
    }

    if new_len < old_len {
        store.resize(node, new_len, 1)?;
    }
    Ok(())
}
