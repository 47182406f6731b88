use node::{NodeError, NodeStore, Ref};

/// The one place that holds a reference to a node.
///
/// Leaf mutations may relocate the leaf through copy-on-write. The mutation
/// writes the new reference back through this slot before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentSlot {
    /// Held outside the store. The caller picks the new reference up from the
    /// mutation's return value.
    Detached,
    /// Entry `index` of the `Refs` node `parent`, which must be writable.
    Child { parent: Ref, index: usize },
}

impl ParentSlot {
    pub(crate) fn write_back(self, store: &mut NodeStore, r: Ref) -> Result<(), NodeError> {
        match self {
            ParentSlot::Detached => Ok(()),
            ParentSlot::Child { parent, index } => store.set_child_ref(parent, index, r),
        }
    }
}
