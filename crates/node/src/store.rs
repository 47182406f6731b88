use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use crate::{NodeError, NodeHeader, NodeKind, Ref, HEADER_BYTES, MAX_NODE_ELEMENTS};

/// A single node: header plus payload buffer.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) header: NodeHeader,
    pub(crate) data: Vec<u8>,
}

impl Node {
    fn cost(&self) -> usize {
        HEADER_BYTES + self.data.len()
    }
}

/// Arena of nodes addressed by [`Ref`].
///
/// A `Ref` is the slot index plus one, so `Ref::NULL` never names a node.
/// Slots at or below `baseline` belong to a committed generation and are
/// read-only. Freed slots above the baseline are recycled by later
/// allocations.
///
/// The store optionally enforces a byte budget (header plus payload of every
/// live node). Exceeding it fails with [`NodeError::OutOfSpace`] before
/// anything is modified.
pub struct NodeStore {
    pub(crate) nodes: Vec<Option<Node>>,
    /// Highest frozen reference value.
    pub(crate) baseline: u64,
    /// Recyclable slot indexes, all above the baseline.
    free: Vec<usize>,
    /// Bytes held by live nodes.
    used: usize,
    limit: Option<usize>,
}

impl NodeStore {
    /// Creates an empty store with no byte budget.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            baseline: 0,
            free: Vec::new(),
            used: 0,
            limit: None,
        }
    }

    /// Creates an empty store that refuses to hold more than `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Replaces the byte budget. Already allocated nodes are kept even if
    /// they exceed the new limit.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bytes held by live nodes, headers included.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Returns `true` if `r` belongs to a committed generation.
    #[must_use]
    pub fn is_read_only(&self, r: Ref) -> bool {
        r.get() <= self.baseline
    }

    /// Freezes every node allocated so far.
    pub fn commit(&mut self) {
        self.baseline = self.nodes.len() as u64;
        self.free.clear();
        trace!(baseline = self.baseline, "committed generation");
    }

    /// Allocates an empty node.
    pub fn alloc(&mut self, kind: NodeKind, context_flag: bool) -> Result<Ref, NodeError> {
        let node = Node {
            header: NodeHeader {
                kind,
                context_flag,
                size: 0,
            },
            data: Vec::new(),
        };
        self.reserve(node.cost())?;
        let r = self.insert(node);
        trace!(node = %r, ?kind, context_flag, "allocated node");
        Ok(r)
    }

    /// Returns a writable version of `r`.
    ///
    /// Writable nodes are returned unchanged. Read-only nodes are copied; the
    /// caller must store the returned reference wherever `r` was held.
    pub fn duplicate_for_write(&mut self, r: Ref) -> Result<Ref, NodeError> {
        let node = self.node(r)?;
        if !self.is_read_only(r) {
            return Ok(r);
        }
        let copy = node.clone();
        self.reserve(copy.cost())?;
        let new_ref = self.insert(copy);
        trace!(from = %r, to = %new_ref, "copy-on-write");
        Ok(new_ref)
    }

    pub fn header(&self, r: Ref) -> Result<NodeHeader, NodeError> {
        Ok(self.node(r)?.header)
    }

    /// Element count recorded in the node header.
    pub fn declared_length(&self, r: Ref) -> Result<usize, NodeError> {
        Ok(self.node(r)?.header.size)
    }

    /// Payload size in bytes as actually stored.
    pub fn payload_len(&self, r: Ref) -> Result<usize, NodeError> {
        Ok(self.node(r)?.data.len())
    }

    pub fn context_flag(&self, r: Ref) -> Result<bool, NodeError> {
        Ok(self.node(r)?.header.context_flag)
    }

    pub fn set_context_flag(&mut self, r: Ref, flag: bool) -> Result<(), NodeError> {
        self.node_mut(r)?.header.context_flag = flag;
        Ok(())
    }

    /// Payload of a `Bytes` node.
    pub fn bytes(&self, r: Ref) -> Result<&[u8], NodeError> {
        let node = self.node(r)?;
        if node.header.kind != NodeKind::Bytes {
            return Err(NodeError::KindMismatch {
                node: r,
                expected: NodeKind::Bytes,
            });
        }
        Ok(&node.data)
    }

    /// Mutable payload of a writable `Bytes` node.
    pub fn bytes_mut(&mut self, r: Ref) -> Result<&mut [u8], NodeError> {
        let node = self.node_mut(r)?;
        if node.header.kind != NodeKind::Bytes {
            return Err(NodeError::KindMismatch {
                node: r,
                expected: NodeKind::Bytes,
            });
        }
        Ok(&mut node.data)
    }

    /// Grows or shrinks a writable node to `len` elements of `width` bytes.
    ///
    /// Existing bytes up to the new length are preserved, new bytes are
    /// zeroed. Any shifting of content is the caller's job.
    pub fn resize(&mut self, r: Ref, len: usize, width: usize) -> Result<(), NodeError> {
        if len > MAX_NODE_ELEMENTS {
            return Err(NodeError::TooLarge { node: r, size: len });
        }
        let (actual, old_bytes) = {
            let node = self.node_mut(r)?;
            (node.header.kind.width(), node.data.len())
        };
        if actual != width {
            return Err(NodeError::WidthMismatch {
                node: r,
                actual,
                requested: width,
            });
        }
        let new_bytes = len * width;
        if new_bytes > old_bytes {
            self.reserve(new_bytes - old_bytes)?;
        }

        let node = self.node_mut(r)?;
        node.data.resize(new_bytes, 0);
        node.header.size = len;
        self.used = self.used - old_bytes + new_bytes;
        Ok(())
    }

    /// Number of child references in a `Refs` node.
    pub fn child_count(&self, r: Ref) -> Result<usize, NodeError> {
        let node = self.refs_node(r)?;
        Ok(node.header.size)
    }

    pub fn child_ref(&self, r: Ref, index: usize) -> Result<Ref, NodeError> {
        let node = self.refs_node(r)?;
        let count = node.header.size;
        if index >= count {
            return Err(NodeError::ChildIndex {
                node: r,
                index,
                count,
            });
        }
        let at = index * NodeKind::Refs.width();
        Ok(Ref::from_raw(LittleEndian::read_u64(&node.data[at..at + 8])))
    }

    /// Appends a child reference to a writable `Refs` node.
    pub fn append_child_ref(&mut self, r: Ref, child: Ref) -> Result<(), NodeError> {
        let count = self.child_count(r)?;
        self.resize(r, count + 1, NodeKind::Refs.width())?;
        self.set_child_ref(r, count, child)
    }

    /// Overwrites a child reference in a writable `Refs` node.
    pub fn set_child_ref(&mut self, r: Ref, index: usize, child: Ref) -> Result<(), NodeError> {
        let node = self.node_mut(r)?;
        if node.header.kind != NodeKind::Refs {
            return Err(NodeError::KindMismatch {
                node: r,
                expected: NodeKind::Refs,
            });
        }
        let count = node.header.size;
        if index >= count {
            return Err(NodeError::ChildIndex {
                node: r,
                index,
                count,
            });
        }
        let at = index * NodeKind::Refs.width();
        LittleEndian::write_u64(&mut node.data[at..at + 8], child.get());
        Ok(())
    }

    /// Releases a single node.
    ///
    /// Frozen nodes belong to a committed generation and stay in place.
    pub fn free(&mut self, r: Ref) -> Result<(), NodeError> {
        self.node(r)?;
        if self.is_read_only(r) {
            trace!(node = %r, "skipped free of frozen node");
            return Ok(());
        }
        let idx = (r.get() - 1) as usize;
        if let Some(node) = self.nodes[idx].take() {
            self.used -= node.cost();
            self.free.push(idx);
        }
        Ok(())
    }

    /// Releases `r` and, recursively, every node reachable through its child
    /// references. Null children are skipped.
    pub fn destroy_deep(&mut self, r: Ref) -> Result<(), NodeError> {
        if r.is_null() {
            return Ok(());
        }
        if self.header(r)?.kind.has_refs() {
            for i in 0..self.child_count(r)? {
                let child = self.child_ref(r, i)?;
                self.destroy_deep(child)?;
            }
        }
        self.free(r)
    }

    // -------------------- internals --------------------

    pub(crate) fn node(&self, r: Ref) -> Result<&Node, NodeError> {
        if r.is_null() {
            return Err(NodeError::NullRef);
        }
        self.nodes
            .get((r.get() - 1) as usize)
            .and_then(Option::as_ref)
            .ok_or(NodeError::Dangling(r))
    }

    fn node_mut(&mut self, r: Ref) -> Result<&mut Node, NodeError> {
        if r.is_null() {
            return Err(NodeError::NullRef);
        }
        if self.is_read_only(r) {
            // Report dangling before read-only so the error names the real fault.
            self.node(r)?;
            return Err(NodeError::ReadOnly(r));
        }
        self.nodes
            .get_mut((r.get() - 1) as usize)
            .and_then(Option::as_mut)
            .ok_or(NodeError::Dangling(r))
    }

    fn refs_node(&self, r: Ref) -> Result<&Node, NodeError> {
        let node = self.node(r)?;
        if node.header.kind != NodeKind::Refs {
            return Err(NodeError::KindMismatch {
                node: r,
                expected: NodeKind::Refs,
            });
        }
        Ok(node)
    }

    fn reserve(&self, additional: usize) -> Result<(), NodeError> {
        if let Some(limit) = self.limit {
            let available = limit.saturating_sub(self.used);
            if additional > available {
                return Err(NodeError::OutOfSpace {
                    requested: additional,
                    available,
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, node: Node) -> Ref {
        self.used += node.cost();
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        Ref::from_raw(idx as u64 + 1)
    }

    /// Appends a node while loading a snapshot.
    pub(crate) fn load_node(&mut self, node: Node) -> Ref {
        self.insert(node)
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("node_count", &self.node_count())
            .field("used_bytes", &self.used)
            .field("limit", &self.limit)
            .field("baseline", &self.baseline)
            .finish()
    }
}
