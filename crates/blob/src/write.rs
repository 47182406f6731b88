use node::{NodeStore, Ref};
use tracing::{debug, warn};

use crate::leaf::replaced_length;
use crate::{Blob, BlobDirectory, BlobError, Layout, ParentSlot};

impl<const CAP: usize> Blob<CAP> {
    /// Replaces bytes `begin..end` with `data`, optionally followed by a zero
    /// byte, and returns the new root reference.
    ///
    /// A flat blob whose result fits in `CAP` bytes is rewritten in place. A
    /// flat blob that would outgrow `CAP` is promoted to chunked mode, which
    /// is only possible for a tail append (`begin == end == len`). A chunked
    /// blob is append-only: `begin` and `end` must both be `0` and `data` is
    /// appended.
    ///
    /// # Errors
    ///
    /// - [`BlobError::RangeOutOfBounds`] unless `begin <= end <= len` on a
    ///   flat blob.
    /// - [`BlobError::UnsupportedMutation`] for a genuine range against a
    ///   chunked blob, or a non-append mutation that would need promotion.
    /// - [`BlobError::Node`] if the store runs out of space. A failed flat
    ///   replace or promotion leaves the blob as it was; a failed chunked
    ///   append keeps the bytes appended before the failure.
    pub fn replace(
        &mut self,
        store: &mut NodeStore,
        begin: usize,
        end: usize,
        data: &[u8],
        add_zero_terminator: bool,
    ) -> Result<Ref, BlobError> {
        match Layout::<CAP>::resolve(store, self.root)? {
            Layout::Flat(mut leaf) => {
                let len = leaf.len(store)?;
                if begin > end || end > len {
                    return Err(BlobError::RangeOutOfBounds { begin, end, len });
                }
                let new_len = replaced_length(len, begin, end, data.len(), add_zero_terminator);
                if new_len <= CAP {
                    self.root =
                        leaf.replace(store, ParentSlot::Detached, begin, end, data, add_zero_terminator)?;
                } else if begin == len {
                    self.promote(store, len, data, add_zero_terminator)?;
                } else {
                    return Err(BlobError::UnsupportedMutation { begin, end });
                }
            }
            Layout::Chunked(mut dir) => {
                if begin != 0 || end != 0 {
                    return Err(BlobError::UnsupportedMutation { begin, end });
                }
                let appended = append_payload(store, &mut dir, data, add_zero_terminator);
                self.root = dir.node();
                appended?;
            }
        }
        Ok(self.root)
    }

    /// Appends `data` at the end, whatever the mode.
    pub fn append(
        &mut self,
        store: &mut NodeStore,
        data: &[u8],
        add_zero_terminator: bool,
    ) -> Result<Ref, BlobError> {
        match Layout::<CAP>::resolve(store, self.root)? {
            Layout::Flat(leaf) => {
                let len = leaf.len(store)?;
                self.replace(store, len, len, data, add_zero_terminator)
            }
            Layout::Chunked(_) => self.replace(store, 0, 0, data, add_zero_terminator),
        }
    }

    /// Inserts `data` before `pos`. On a chunked blob only `pos ==
    /// logical_size` is accepted, as an append.
    pub fn insert(
        &mut self,
        store: &mut NodeStore,
        pos: usize,
        data: &[u8],
        add_zero_terminator: bool,
    ) -> Result<Ref, BlobError> {
        match Layout::<CAP>::resolve(store, self.root)? {
            Layout::Flat(_) => self.replace(store, pos, pos, data, add_zero_terminator),
            Layout::Chunked(dir) => {
                if pos != dir.logical_size(store)? {
                    return Err(BlobError::UnsupportedMutation { begin: pos, end: pos });
                }
                self.replace(store, 0, 0, data, add_zero_terminator)
            }
        }
    }

    /// Removes bytes `begin..end`. Flat blobs only.
    pub fn erase(&mut self, store: &mut NodeStore, begin: usize, end: usize) -> Result<Ref, BlobError> {
        self.require_flat(store, begin, end)?;
        self.replace(store, begin, end, &[], false)
    }

    /// Shortens the blob to `new_len` bytes. Flat blobs only.
    pub fn truncate(&mut self, store: &mut NodeStore, new_len: usize) -> Result<Ref, BlobError> {
        let len = self.logical_size(store)?;
        self.erase(store, new_len, len)
    }

    /// Removes every byte. Flat blobs only.
    pub fn clear(&mut self, store: &mut NodeStore) -> Result<Ref, BlobError> {
        self.truncate(store, 0)
    }

    /// Releases the root and every node below it. Nodes of a committed
    /// generation stay in place.
    pub fn destroy(self, store: &mut NodeStore) -> Result<(), BlobError> {
        store.destroy_deep(self.root)?;
        Ok(())
    }

    fn require_flat(&self, store: &NodeStore, begin: usize, end: usize) -> Result<(), BlobError> {
        match Layout::<CAP>::resolve(store, self.root)? {
            Layout::Flat(_) => Ok(()),
            Layout::Chunked(_) => Err(BlobError::UnsupportedMutation { begin, end }),
        }
    }

    /// Turns the flat root into the first child of a new directory and
    /// appends the payload there.
    fn promote(
        &mut self,
        store: &mut NodeStore,
        flat_len: usize,
        data: &[u8],
        add_zero_terminator: bool,
    ) -> Result<(), BlobError> {
        let flat = self.root;
        let mut dir = BlobDirectory::<CAP>::create(store)?;
        if let Err(e) = store.append_child_ref(dir.node(), flat) {
            let _ = store.free(dir.node());
            return Err(e.into());
        }

        if let Err(e) = append_payload(store, &mut dir, data, add_zero_terminator) {
            warn!(root = %flat, error = %e, "promotion failed, rolling back");
            undo_promotion(store, dir.node(), flat, flat_len);
            return Err(e);
        }

        debug!(
            from = %flat,
            to = %dir.node(),
            appended = data.len() + usize::from(add_zero_terminator),
            "promoted blob to chunked"
        );
        self.root = dir.node();
        Ok(())
    }
}

/// Directory append of `data`, then of the terminator byte.
fn append_payload<const CAP: usize>(
    store: &mut NodeStore,
    dir: &mut BlobDirectory<CAP>,
    data: &[u8],
    add_zero_terminator: bool,
) -> Result<(), BlobError> {
    dir.append(store, data)?;
    if add_zero_terminator {
        dir.append(store, &[0])?;
    }
    Ok(())
}

/// Releases everything a failed promotion allocated and restores the flat
/// node's length. Best effort: the store is already short of space.
fn undo_promotion(store: &mut NodeStore, dir: Ref, flat: Ref, flat_len: usize) {
    let count = store.child_count(dir).unwrap_or(0);
    for index in 1..count {
        if let Ok(child) = store.child_ref(dir, index) {
            let _ = store.free(child);
        }
    }
    match store.child_ref(dir, 0) {
        Ok(first) if first == flat => {
            if !store.is_read_only(flat) {
                let _ = store.resize(flat, flat_len, 1);
            }
        }
        Ok(copy) => {
            let _ = store.free(copy);
        }
        Err(_) => {}
    }
    let _ = store.free(dir);
}
