//! Snapshot file: the persistent form of a [`NodeStore`].
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ NODE RECORDS (one per node reachable from top, ascending ref)  │
//! │                                                               │
//! │ crc32 (u32) | ref (u64) | kind (u8) | context (u8)            │
//! │ size (u32) | data_len (u32) | data                            │
//! │                                                               │
//! │ The CRC32 covers everything after itself in the record.       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 20 bytes)                                  │
//! │                                                               │
//! │ node_count (u64 LE) | top_ref (u64 LE) | magic (u32 LE) "BNS1" │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records carry the saving store's references, which may have gaps. Nodes
//! not reachable from the top reference (old copy-on-write versions, leaked
//! nodes) are dropped. Loading renumbers the records densely in ascending
//! order and rewrites child references to match, so the top reference
//! returned by [`NodeStore::open`] can differ from the one saved.
//!
//! Saves are atomic: the file is written to `<path>.tmp`, fsynced, and
//! renamed over the target. The temporary file is removed if any step fails.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::store::Node;
use crate::{NodeError, NodeHeader, NodeKind, NodeStore, Ref, MAX_NODE_ELEMENTS};

/// Magic number identifying snapshot files (ASCII "BNS1").
pub const SNAPSHOT_MAGIC: u32 = 0x424E_5331;

/// Size of the footer in bytes: 8 (`node_count`) + 8 (`top_ref`) + 4 (`magic`).
pub const FOOTER_BYTES: usize = 8 + 8 + 4;

/// Fixed part of a node record after the CRC:
/// 8 (`ref`) + 1 (`kind`) + 1 (`context`) + 4 (`size`) + 4 (`data_len`).
const RECORD_FIXED_BYTES: usize = 8 + 1 + 1 + 4 + 4;

impl NodeStore {
    /// Writes every node reachable from `top` to `path` and commits the
    /// store, so the saved nodes become the new read-only generation.
    ///
    /// `top` may be [`Ref::NULL`] for an empty snapshot. When `sync` is
    /// `true` the file and its parent directory are fsynced.
    pub fn save<P: AsRef<Path>>(&mut self, path: P, top: Ref, sync: bool) -> Result<(), NodeError> {
        let path = path.as_ref();
        let reachable = self.reachable_from(top)?;

        let tmp_path = tmp_path_for(path);
        if let Err(e) = self.write_snapshot(&tmp_path, path, &reachable, top, sync) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        self.commit();
        debug!(
            path = %path.display(),
            nodes = reachable.len(),
            top = %top,
            "saved snapshot"
        );
        Ok(())
    }

    fn write_snapshot(
        &self,
        tmp_path: &Path,
        path: &Path,
        reachable: &[Ref],
        top: Ref,
        sync: bool,
    ) -> Result<(), NodeError> {
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        let mut record_buf: Vec<u8> = Vec::with_capacity(256);
        for &r in reachable {
            let node = self.node(r)?;

            record_buf.clear();
            record_buf.write_u64::<LittleEndian>(r.get())?;
            record_buf.write_u8(node.header.kind.to_u8())?;
            record_buf.write_u8(u8::from(node.header.context_flag))?;
            record_buf.write_u32::<LittleEndian>(node.header.size as u32)?;
            record_buf.write_u32::<LittleEndian>(node.data.len() as u32)?;
            record_buf.extend_from_slice(&node.data);

            let mut hasher = Crc32::new();
            hasher.update(&record_buf);
            file.write_u32::<LittleEndian>(hasher.finalize())?;
            file.write_all(&record_buf)?;
        }

        file.write_u64::<LittleEndian>(reachable.len() as u64)?;
        file.write_u64::<LittleEndian>(top.get())?;
        file.write_u32::<LittleEndian>(SNAPSHOT_MAGIC)?;

        file.flush()?;
        let file = file.into_inner().map_err(|e| e.into_error())?;
        if sync {
            file.sync_all()?;
        }
        drop(file);

        rename(tmp_path, path)?;

        if sync {
            if let Some(parent) = path.parent() {
                if let Ok(dir) = std::fs::File::open(parent) {
                    let _ = dir.sync_all();
                }
            }
        }
        Ok(())
    }

    /// Loads a snapshot written by [`save`](NodeStore::save).
    ///
    /// Returns the store, whose nodes are all read-only, and the top
    /// reference recorded in the footer.
    ///
    /// # Errors
    ///
    /// [`NodeError::Corrupt`] on a bad magic, a CRC mismatch, a truncated or
    /// duplicated record, a size that disagrees with the payload, a node
    /// count that disagrees with the footer, or a top or child reference
    /// that names no record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(NodeStore, Ref), NodeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;

        if bytes.len() < FOOTER_BYTES {
            return Err(NodeError::Corrupt("file too small for snapshot footer".into()));
        }
        let (mut body, mut footer) = bytes.split_at(bytes.len() - FOOTER_BYTES);
        let node_count = footer.read_u64::<LittleEndian>()?;
        let top = Ref::from_raw(footer.read_u64::<LittleEndian>()?);
        let magic = footer.read_u32::<LittleEndian>()?;
        if magic != SNAPSHOT_MAGIC {
            return Err(NodeError::Corrupt(format!(
                "unknown snapshot magic: {:#x}",
                magic
            )));
        }

        let mut records: BTreeMap<u64, Node> = BTreeMap::new();

        while !body.is_empty() {
            if body.len() < 4 + RECORD_FIXED_BYTES {
                return Err(NodeError::Corrupt("truncated node record".into()));
            }
            let stored_crc = body.read_u32::<LittleEndian>()?;
            let record_start = body;

            let raw = body.read_u64::<LittleEndian>()?;
            let kind = body.read_u8()?;
            let context = body.read_u8()?;
            let size = body.read_u32::<LittleEndian>()? as usize;
            let data_len = body.read_u32::<LittleEndian>()? as usize;
            if body.len() < data_len {
                return Err(NodeError::Corrupt(format!(
                    "node record {:#x}: payload truncated",
                    raw
                )));
            }

            let mut hasher = Crc32::new();
            hasher.update(&record_start[..RECORD_FIXED_BYTES + data_len]);
            let actual_crc = hasher.finalize();
            if actual_crc != stored_crc {
                return Err(NodeError::Corrupt(format!(
                    "CRC32 mismatch in node record {:#x}: expected {:#010x}, got {:#010x}",
                    raw, stored_crc, actual_crc
                )));
            }

            let (data, rest) = body.split_at(data_len);
            body = rest;

            let kind = NodeKind::from_u8(kind).ok_or_else(|| {
                NodeError::Corrupt(format!("node record {:#x}: unknown kind {}", raw, kind))
            })?;
            let context_flag = match context {
                0 => false,
                1 => true,
                other => {
                    return Err(NodeError::Corrupt(format!(
                        "node record {:#x}: invalid context flag {}",
                        raw, other
                    )))
                }
            };
            if raw == 0 {
                return Err(NodeError::Corrupt("node record with null reference".into()));
            }
            if size > MAX_NODE_ELEMENTS || size * kind.width() != data_len {
                return Err(NodeError::Corrupt(format!(
                    "node record {:#x}: size {} does not match payload of {} bytes",
                    raw, size, data_len
                )));
            }

            let node = Node {
                header: NodeHeader {
                    kind,
                    context_flag,
                    size,
                },
                data: data.to_vec(),
            };
            if records.insert(raw, node).is_some() {
                return Err(NodeError::Corrupt(format!("duplicate node record {:#x}", raw)));
            }
        }

        let loaded = records.len() as u64;
        if loaded != node_count {
            return Err(NodeError::Corrupt(format!(
                "footer records {} nodes, file holds {}",
                node_count, loaded
            )));
        }

        // Stored reference -> dense reference in the loaded store.
        let renumber: BTreeMap<u64, Ref> = records
            .keys()
            .enumerate()
            .map(|(i, &raw)| (raw, Ref::from_raw(i as u64 + 1)))
            .collect();
        let resolve = |raw: u64| -> Result<Ref, NodeError> {
            if raw == 0 {
                return Ok(Ref::NULL);
            }
            renumber
                .get(&raw)
                .copied()
                .ok_or_else(|| NodeError::Corrupt(format!("reference {:#x} has no record", raw)))
        };

        let top = resolve(top.get())?;
        let mut store = NodeStore::new();
        for (raw, mut node) in records {
            if node.header.kind.has_refs() {
                for child in node.data.chunks_exact_mut(NodeKind::Refs.width()) {
                    let target = resolve(LittleEndian::read_u64(child)).map_err(|_| {
                        NodeError::Corrupt(format!("node record {:#x}: dangling child reference", raw))
                    })?;
                    LittleEndian::write_u64(child, target.get());
                }
            }
            store.load_node(node);
        }

        store.commit();
        debug!(path = %path.display(), nodes = loaded, top = %top, "opened snapshot");
        Ok((store, top))
    }

    /// Every node reachable from `top`, in ascending reference order.
    fn reachable_from(&self, top: Ref) -> Result<Vec<Ref>, NodeError> {
        let mut seen = BTreeSet::new();
        if top.is_null() {
            return Ok(Vec::new());
        }
        let mut stack = vec![top];
        while let Some(r) = stack.pop() {
            if !seen.insert(r) {
                continue;
            }
            if self.header(r)?.kind.has_refs() {
                for i in 0..self.child_count(r)? {
                    let child = self.child_ref(r, i)?;
                    if !child.is_null() {
                        stack.push(child);
                    }
                }
            }
        }
        Ok(seen.into_iter().collect())
    }
}

/// `<path>.tmp`, keeping the full file name of `path`.
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
