//! Binary array: an ordered list of nullable byte strings packed into one
//! blob.
//!
//! ```text
//! top (Refs node)
//! ├── [0] offsets   Bytes node, one u64 LE end offset per entry
//! ├── [1] data      Blob holding every value back to back
//! └── [2] nulls     Bytes node, one 0/1 flag per entry
//! ```
//!
//! Entry `i` occupies `offsets[i - 1]..offsets[i]` of the data blob, or
//! `0..offsets[0]` for the first entry. A stored zero terminator counts as
//! part of the entry. A null entry stores no bytes of its own.
//!
//! Edits go through the data blob's range helpers, so once the data blob is
//! chunked only appends at the end of the array succeed.

use byteorder::{ByteOrder, LittleEndian};
use node::{NodeKind, NodeStore, Ref};
use tracing::trace;

use crate::{Blob, BlobError, MAX_LEAF_CAPACITY};

const OFFSETS: usize = 0;
const DATA: usize = 1;
const NULLS: usize = 2;
const OFFSET_BYTES: usize = 8;

/// Handle to a binary array, like [`Blob`] only the top reference.
/// Mutations return the top reference, which moves when copy-on-write
/// relocates a committed top node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryArray<const CAP: usize = MAX_LEAF_CAPACITY> {
    top: Ref,
}

impl<const CAP: usize> BinaryArray<CAP> {
    /// Creates an empty array.
    pub fn create(store: &mut NodeStore) -> Result<Self, BlobError> {
        let top = store.alloc(NodeKind::Refs, false)?;
        if let Err(e) = Self::build(store, top) {
            let _ = store.destroy_deep(top);
            return Err(e);
        }
        Ok(Self { top })
    }

    fn build(store: &mut NodeStore, top: Ref) -> Result<(), BlobError> {
        // All three slots stay null until filled.
        store.resize(top, 3, NodeKind::Refs.width())?;
        let offsets = store.alloc(NodeKind::Bytes, false)?;
        store.set_child_ref(top, OFFSETS, offsets)?;
        let data = Blob::<CAP>::create(store)?;
        store.set_child_ref(top, DATA, data.root())?;
        let nulls = store.alloc(NodeKind::Bytes, false)?;
        store.set_child_ref(top, NULLS, nulls)?;
        Ok(())
    }

    #[must_use]
    pub const fn from_ref(top: Ref) -> Self {
        Self { top }
    }

    #[must_use]
    pub const fn top(&self) -> Ref {
        self.top
    }

    /// Number of entries.
    pub fn len(&self, store: &NodeStore) -> Result<usize, BlobError> {
        let nulls = self.child(store, NULLS)?;
        Ok(store.declared_length(nulls)?)
    }

    pub fn is_empty(&self, store: &NodeStore) -> Result<bool, BlobError> {
        Ok(self.len(store)? == 0)
    }

    pub fn is_null(&self, store: &NodeStore, index: usize) -> Result<bool, BlobError> {
        self.check_index(store, index)?;
        let nulls = self.child(store, NULLS)?;
        Ok(store.bytes(nulls)?[index] != 0)
    }

    /// Value of entry `index`, `None` if it is null.
    pub fn get(&self, store: &NodeStore, index: usize) -> Result<Option<Vec<u8>>, BlobError> {
        if self.is_null(store, index)? {
            return Ok(None);
        }
        let (begin, end) = self.bounds(store, index)?;
        self.data(store)?.read_range(store, begin, end).map(Some)
    }

    /// Appends an entry.
    pub fn add(
        &mut self,
        store: &mut NodeStore,
        value: Option<&[u8]>,
        add_zero_terminator: bool,
    ) -> Result<Ref, BlobError> {
        let len = self.len(store)?;
        self.insert(store, len, value, add_zero_terminator)
    }

    /// Inserts an entry before `index`. `index == len` appends.
    pub fn insert(
        &mut self,
        store: &mut NodeStore,
        index: usize,
        value: Option<&[u8]>,
        add_zero_terminator: bool,
    ) -> Result<Ref, BlobError> {
        let len = self.len(store)?;
        if index > len {
            return Err(BlobError::IndexOutOfBounds { index, len });
        }
        let pos = if index == 0 { 0 } else { self.bounds(store, index - 1)?.1 };
        let bytes = value.unwrap_or(&[]);
        let stored = bytes.len() + usize::from(add_zero_terminator);

        let (offsets, nulls) = self.make_writable(store)?;
        store.resize(offsets, (len + 1) * OFFSET_BYTES, 1)?;
        if let Err(e) = store.resize(nulls, len + 1, 1) {
            store.resize(offsets, len * OFFSET_BYTES, 1)?;
            return Err(e.into());
        }
        if let Err(e) = self.edit_data(store, |data, store| {
            data.insert(store, pos, bytes, add_zero_terminator)
        }) {
            store.resize(offsets, len * OFFSET_BYTES, 1)?;
            store.resize(nulls, len, 1)?;
            return Err(e);
        }

        let table = store.bytes_mut(offsets)?;
        for i in (index..len).rev() {
            let end = offset_at(table, i) + stored;
            set_offset(table, i + 1, end);
        }
        set_offset(table, index, pos + stored);
        let flags = store.bytes_mut(nulls)?;
        flags.copy_within(index..len, index + 1);
        flags[index] = u8::from(value.is_none());

        trace!(array = %self.top, index, stored, "inserted entry");
        Ok(self.top)
    }

    /// Overwrites entry `index`.
    pub fn set(
        &mut self,
        store: &mut NodeStore,
        index: usize,
        value: Option<&[u8]>,
        add_zero_terminator: bool,
    ) -> Result<Ref, BlobError> {
        self.check_index(store, index)?;
        let len = self.len(store)?;
        let (begin, end) = self.bounds(store, index)?;
        let bytes = value.unwrap_or(&[]);
        let stored = bytes.len() + usize::from(add_zero_terminator);

        let (offsets, nulls) = self.make_writable(store)?;
        self.edit_data(store, |data, store| {
            if begin == end {
                data.insert(store, begin, bytes, add_zero_terminator)
            } else {
                data.replace(store, begin, end, bytes, add_zero_terminator)
            }
        })?;

        let table = store.bytes_mut(offsets)?;
        for i in index..len {
            let shifted = offset_at(table, i) - (end - begin) + stored;
            set_offset(table, i, shifted);
        }
        store.bytes_mut(nulls)?[index] = u8::from(value.is_none());
        Ok(self.top)
    }

    /// Removes entry `index`.
    pub fn erase(&mut self, store: &mut NodeStore, index: usize) -> Result<Ref, BlobError> {
        self.check_index(store, index)?;
        let len = self.len(store)?;
        let (begin, end) = self.bounds(store, index)?;

        let (offsets, nulls) = self.make_writable(store)?;
        if begin < end {
            self.edit_data(store, |data, store| data.erase(store, begin, end))?;
        }

        let table = store.bytes_mut(offsets)?;
        for i in index + 1..len {
            let shifted = offset_at(table, i) - (end - begin);
            set_offset(table, i - 1, shifted);
        }
        store.bytes_mut(nulls)?.copy_within(index + 1..len, index);
        store.resize(offsets, (len - 1) * OFFSET_BYTES, 1)?;
        store.resize(nulls, len - 1, 1)?;
        Ok(self.top)
    }

    /// Releases the array and everything below it.
    pub fn destroy(self, store: &mut NodeStore) -> Result<(), BlobError> {
        store.destroy_deep(self.top)?;
        Ok(())
    }

    /// Structural check: table shapes, offsets ascending and ending at the
    /// data size, flags 0 or 1, and the data blob itself.
    pub fn verify(&self, store: &NodeStore) -> Result<(), BlobError> {
        let header = store.header(self.top)?;
        if header.kind != NodeKind::Refs || header.size != 3 {
            return Err(BlobError::corrupt(self.top, "array top must hold three references"));
        }
        let offsets = self.child(store, OFFSETS)?;
        let nulls = self.child(store, NULLS)?;
        let data = self.data(store)?;

        let flags = store.bytes(nulls)?;
        let table = store.bytes(offsets)?;
        if table.len() != flags.len() * OFFSET_BYTES {
            return Err(BlobError::corrupt(
                offsets,
                format!("{} offset bytes for {} entries", table.len(), flags.len()),
            ));
        }
        if let Some(pos) = flags.iter().position(|&f| f > 1) {
            return Err(BlobError::corrupt(nulls, format!("entry {} has null flag {}", pos, flags[pos])));
        }
        let mut prev = 0;
        for i in 0..flags.len() {
            let end = offset_at(table, i);
            if end < prev {
                return Err(BlobError::corrupt(offsets, format!("offset {} goes backwards", i)));
            }
            prev = end;
        }
        let size = data.logical_size(store)?;
        if prev != size {
            return Err(BlobError::corrupt(
                offsets,
                format!("offsets end at {}, data holds {} bytes", prev, size),
            ));
        }
        data.verify(store)
    }

    // -------------------- internals --------------------

    fn child(&self, store: &NodeStore, index: usize) -> Result<Ref, BlobError> {
        Ok(store.child_ref(self.top, index)?)
    }

    fn data(&self, store: &NodeStore) -> Result<Blob<CAP>, BlobError> {
        Ok(Blob::from_ref(self.child(store, DATA)?))
    }

    fn check_index(&self, store: &NodeStore, index: usize) -> Result<(), BlobError> {
        let len = self.len(store)?;
        if index >= len {
            return Err(BlobError::IndexOutOfBounds { index, len });
        }
        Ok(())
    }

    /// Byte range of entry `index` in the data blob.
    fn bounds(&self, store: &NodeStore, index: usize) -> Result<(usize, usize), BlobError> {
        let table = store.bytes(self.child(store, OFFSETS)?)?;
        let begin = if index == 0 { 0 } else { offset_at(table, index - 1) };
        Ok((begin, offset_at(table, index)))
    }

    /// Copies the top node and both tables out of a committed generation.
    fn make_writable(&mut self, store: &mut NodeStore) -> Result<(Ref, Ref), BlobError> {
        self.top = store.duplicate_for_write(self.top)?;
        let offsets = writable_child(store, self.top, OFFSETS)?;
        let nulls = writable_child(store, self.top, NULLS)?;
        Ok((offsets, nulls))
    }

    /// Runs a data blob mutation and stores the resulting root, also when
    /// the mutation failed after relocating it.
    fn edit_data<F>(&self, store: &mut NodeStore, op: F) -> Result<(), BlobError>
    where
        F: FnOnce(&mut Blob<CAP>, &mut NodeStore) -> Result<Ref, BlobError>,
    {
        let mut data = self.data(store)?;
        let result = op(&mut data, store);
        store.set_child_ref(self.top, DATA, data.root())?;
        result.map(|_| ())
    }
}

fn writable_child(store: &mut NodeStore, top: Ref, index: usize) -> Result<Ref, BlobError> {
    let child = store.child_ref(top, index)?;
    let writable = store.duplicate_for_write(child)?;
    if writable != child {
        store.set_child_ref(top, index, writable)?;
    }
    Ok(writable)
}

fn offset_at(table: &[u8], i: usize) -> usize {
    let at = i * OFFSET_BYTES;
    LittleEndian::read_u64(&table[at..at + OFFSET_BYTES]) as usize
}

fn set_offset(table: &mut [u8], i: usize, value: usize) {
    let at = i * OFFSET_BYTES;
    LittleEndian::write_u64(&mut table[at..at + OFFSET_BYTES], value as u64);
}
