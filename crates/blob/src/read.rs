use node::NodeStore;
use std::io::{self, Read, Seek, SeekFrom};

use crate::{Blob, BlobError, Layout, Segment};

impl<const CAP: usize> Blob<CAP> {
    /// Positional segment read.
    ///
    /// Returns the bytes from `pos` to the end of the physical node holding
    /// `pos`, and the logical position of the next segment (`0` when this is
    /// the last one). Calling again with each returned `next_pos`, starting
    /// at `0`, visits every segment in order. For `pos >= logical_size` the
    /// result is an empty segment with `next_pos == 0`.
    pub fn read_at<'s>(&self, store: &'s NodeStore, pos: usize) -> Result<Segment<'s>, BlobError> {
        match Layout::<CAP>::resolve(store, self.root)? {
            Layout::Chunked(dir) => dir.read_at(store, pos),
            Layout::Flat(leaf) => {
                if pos < leaf.len(store)? {
                    Ok(Segment {
                        data: leaf.read(store, pos)?,
                        next_pos: 0,
                    })
                } else {
                    Ok(Segment::empty())
                }
            }
        }
    }

    /// Total number of bytes in the blob.
    pub fn logical_size(&self, store: &NodeStore) -> Result<usize, BlobError> {
        match Layout::<CAP>::resolve(store, self.root)? {
            Layout::Flat(leaf) => leaf.len(store),
            Layout::Chunked(dir) => dir.logical_size(store),
        }
    }

    /// Lengths of the physical nodes holding the bytes, in order. A flat
    /// blob reports its single node.
    pub fn child_lengths(&self, store: &NodeStore) -> Result<Vec<usize>, BlobError> {
        match Layout::<CAP>::resolve(store, self.root)? {
            Layout::Flat(leaf) => Ok(vec![leaf.len(store)?]),
            Layout::Chunked(dir) => (0..dir.child_count(store)?)
                .map(|i| dir.child(store, i)?.len(store))
                .collect(),
        }
    }

    /// Iterator over the physical segments, driven by [`read_at`](Blob::read_at).
    pub fn segments<'s>(&self, store: &'s NodeStore) -> Segments<'s, CAP> {
        Segments {
            blob: *self,
            store,
            pos: 0,
            done: false,
        }
    }

    /// `io::Read + io::Seek` adapter over the logical byte sequence.
    pub fn reader<'s>(&self, store: &'s NodeStore) -> Result<BlobReader<'s, CAP>, BlobError> {
        Ok(BlobReader {
            blob: *self,
            store,
            pos: 0,
            len: self.logical_size(store)?,
        })
    }

    /// Copies bytes `begin..end` into one buffer, crossing segments as
    /// needed.
    pub fn read_range(&self, store: &NodeStore, begin: usize, end: usize) -> Result<Vec<u8>, BlobError> {
        let len = self.logical_size(store)?;
        if begin > end || end > len {
            return Err(BlobError::RangeOutOfBounds { begin, end, len });
        }
        let mut out = Vec::with_capacity(end - begin);
        let mut pos = begin;
        while pos < end {
            let seg = self.read_at(store, pos)?;
            let take = seg.data.len().min(end - pos);
            if take == 0 {
                return Err(BlobError::corrupt(self.root, format!("empty segment at {}", pos)));
            }
            out.extend_from_slice(&seg.data[..take]);
            pos += take;
        }
        Ok(out)
    }

    /// Copies the whole blob into one buffer.
    pub fn to_vec(&self, store: &NodeStore) -> Result<Vec<u8>, BlobError> {
        let mut out = Vec::with_capacity(self.logical_size(store)?);
        for segment in self.segments(store) {
            out.extend_from_slice(segment?);
        }
        Ok(out)
    }
}

/// Iterator over a blob's physical segments. See [`Blob::segments`].
///
/// Yields nothing for an empty blob, and stops after the first error.
pub struct Segments<'s, const CAP: usize> {
    blob: Blob<CAP>,
    store: &'s NodeStore,
    pos: usize,
    done: bool,
}

impl<'s, const CAP: usize> Iterator for Segments<'s, CAP> {
    type Item = Result<&'s [u8], BlobError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.blob.read_at(self.store, self.pos) {
            Ok(segment) => {
                if segment.is_final() {
                    self.done = true;
                } else {
                    self.pos = segment.next_pos;
                }
                if segment.data.is_empty() {
                    None
                } else {
                    Some(Ok(segment.data))
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Byte-stream view of a blob. See [`Blob::reader`].
///
/// Each `read` copies from at most one physical segment.
pub struct BlobReader<'s, const CAP: usize> {
    blob: Blob<CAP>,
    store: &'s NodeStore,
    pos: usize,
    len: usize,
}

impl<'s, const CAP: usize> BlobReader<'s, CAP> {
    /// Current logical position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Logical size captured when the reader was created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<'s, const CAP: usize> Read for BlobReader<'s, CAP> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        let segment = self
            .blob
            .read_at(self.store, self.pos)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let n = segment.data.len().min(buf.len());
        buf[..n].copy_from_slice(&segment.data[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl<'s, const CAP: usize> Seek for BlobReader<'s, CAP> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match target {
            SeekFrom::Start(n) => (0i128, n as i128),
            SeekFrom::End(n) => (self.len as i128, n as i128),
            SeekFrom::Current(n) => (self.pos as i128, n as i128),
        };
        let new_pos = base + offset;
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of blob",
            ));
        }
        self.pos = usize::try_from(new_pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek position overflow"))?;
        Ok(self.pos as u64)
    }
}
