use super::pattern;
use crate::*;
use node::{NodeError, NodeKind, NodeStore, Ref};

type Dir = BlobDirectory<10>;

fn leaf_ref(store: &mut NodeStore, content: &[u8]) -> Ref {
    let mut leaf = LeafBlob::<10>::create(store).unwrap();
    leaf.append_within_capacity(store, ParentSlot::Detached, content)
        .unwrap()
}

/// Directory whose children have the given lengths, filled from `pattern`.
fn dir_with(store: &mut NodeStore, lengths: &[usize]) -> (Dir, Vec<u8>) {
    let data = pattern(lengths.iter().sum());
    let dir = Dir::create(store).unwrap();
    let mut at = 0;
    for &len in lengths {
        let child = leaf_ref(store, &data[at..at + len]);
        store.append_child_ref(dir.node(), child).unwrap();
        at += len;
    }
    (dir, data)
}

fn lengths(dir: &Dir, store: &NodeStore) -> Vec<usize> {
    (0..dir.child_count(store).unwrap())
        .map(|i| dir.child(store, i).unwrap().len(store).unwrap())
        .collect()
}

// -------------------- read_at --------------------

#[test]
fn read_at_walks_into_the_middle_child() {
    let mut store = NodeStore::new();
    let (dir, data) = dir_with(&mut store, &[10, 10, 3]);

    let seg = dir.read_at(&store, 15).unwrap();
    assert_eq!(seg.data, &data[15..20]);
    assert_eq!(seg.next_pos, 20);

    let seg = dir.read_at(&store, 20).unwrap();
    assert_eq!(seg.data, &data[20..23]);
    assert_eq!(seg.next_pos, 0);
}

#[test]
fn read_at_child_boundaries() {
    let mut store = NodeStore::new();
    let (dir, data) = dir_with(&mut store, &[10, 10, 3]);

    let seg = dir.read_at(&store, 0).unwrap();
    assert_eq!(seg.data, &data[0..10]);
    assert_eq!(seg.next_pos, 10);

    let seg = dir.read_at(&store, 10).unwrap();
    assert_eq!(seg.data, &data[10..20]);
    assert_eq!(seg.next_pos, 20);

    let seg = dir.read_at(&store, 22).unwrap();
    assert_eq!(seg.data, &data[22..23]);
    assert!(seg.is_final());
}

#[test]
fn read_at_past_end_is_empty() {
    let mut store = NodeStore::new();
    let (dir, _) = dir_with(&mut store, &[10, 3]);
    for pos in [13, 14, 1000] {
        assert_eq!(dir.read_at(&store, pos).unwrap(), Segment::empty());
    }
}

#[test]
fn logical_size_sums_children() {
    let mut store = NodeStore::new();
    let (dir, _) = dir_with(&mut store, &[10, 10, 10, 4]);
    assert_eq!(dir.child_count(&store).unwrap(), 4);
    assert_eq!(dir.logical_size(&store).unwrap(), 34);
}

// -------------------- append --------------------

#[test]
fn append_tops_up_last_child_first() {
    let mut store = NodeStore::new();
    let (mut dir, _) = dir_with(&mut store, &[10, 10, 3]);

    dir.append(&mut store, b"abcd").unwrap();
    assert_eq!(lengths(&dir, &store), vec![10, 10, 7]);

    dir.append(&mut store, b"vwxyz").unwrap();
    assert_eq!(lengths(&dir, &store), vec![10, 10, 10, 2]);
    dir.verify(&store).unwrap();
}

#[test]
fn append_filling_last_child_exactly_adds_no_child() {
    let mut store = NodeStore::new();
    let (mut dir, _) = dir_with(&mut store, &[10, 3]);
    dir.append(&mut store, b"1234567").unwrap();
    assert_eq!(lengths(&dir, &store), vec![10, 10]);
}

#[test]
fn large_append_splits_into_full_children() {
    let mut store = NodeStore::new();
    let (mut dir, mut data) = dir_with(&mut store, &[10, 3]);
    let extra = pattern(35);
    dir.append(&mut store, &extra).unwrap();
    data.extend_from_slice(&extra);

    assert_eq!(lengths(&dir, &store), vec![10, 10, 10, 10, 8]);
    assert_eq!(dir.logical_size(&store).unwrap(), 48);
    assert_eq!(Blob::<10>::from_ref(dir.node()).to_vec(&store).unwrap(), data);
}

#[test]
fn empty_append_is_a_no_op() {
    let mut store = NodeStore::new();
    let (mut dir, _) = dir_with(&mut store, &[10, 3]);
    let before = dir.node();
    store.commit();
    assert_eq!(dir.append(&mut store, b"").unwrap(), before);
    assert_eq!(store.node_count(), 3);
}

#[test]
fn append_to_committed_directory_leaves_old_version_readable() {
    let mut store = NodeStore::new();
    let (mut dir, data) = dir_with(&mut store, &[10, 3]);
    let old = dir.node();
    store.commit();

    let new = dir.append(&mut store, b"++").unwrap();
    assert_ne!(new, old);
    assert_eq!(lengths(&dir, &store), vec![10, 5]);

    let old_view = Dir::from_ref(old);
    assert_eq!(lengths(&old_view, &store), vec![10, 3]);
    assert_eq!(Blob::<10>::from_ref(old).to_vec(&store).unwrap(), data);

    // the topped-up child was copied, the full one is shared
    assert_eq!(
        store.child_ref(new, 0).unwrap(),
        store.child_ref(old, 0).unwrap()
    );
    assert_ne!(
        store.child_ref(new, 1).unwrap(),
        store.child_ref(old, 1).unwrap()
    );
}

#[test]
fn out_of_space_mid_append_keeps_valid_prefix() {
    let mut store = NodeStore::new();
    let (mut dir, _) = dir_with(&mut store, &[10, 3]);
    // top-up of 7, one full leaf with its reference, then room for the
    // next leaf's header only
    store.set_limit(Some(store.used_bytes() + 7 + (8 + 10 + 8) + 8));

    let err = dir.append(&mut store, &pattern(25)).unwrap_err();
    assert!(matches!(err, BlobError::Node(NodeError::OutOfSpace { .. })));
    assert_eq!(lengths(&dir, &store), vec![10, 10, 10]);
    assert_eq!(store.node_count(), 4);
    dir.verify(&store).unwrap();
}

// -------------------- verify --------------------

#[test]
fn verify_accepts_well_formed_directory() {
    let mut store = NodeStore::new();
    let (dir, _) = dir_with(&mut store, &[10, 10, 1]);
    dir.verify(&store).unwrap();
}

#[test]
fn verify_rejects_short_middle_child() {
    let mut store = NodeStore::new();
    let (dir, _) = dir_with(&mut store, &[3, 3]);
    match dir.verify(&store) {
        Err(BlobError::Corrupt { node, reason }) => {
            assert_eq!(node, dir.node());
            assert!(reason.contains("child 0"), "{}", reason);
        }
        other => panic!("expected corruption, got {:?}", other),
    }
}

#[test]
fn verify_rejects_empty_last_child() {
    let mut store = NodeStore::new();
    let (dir, _) = dir_with(&mut store, &[10, 0]);
    assert!(matches!(dir.verify(&store), Err(BlobError::Corrupt { .. })));
}

#[test]
fn verify_rejects_directory_without_children() {
    let mut store = NodeStore::new();
    let dir = Dir::create(&mut store).unwrap();
    assert!(matches!(dir.verify(&store), Err(BlobError::Corrupt { .. })));
}

#[test]
fn verify_rejects_null_child() {
    let mut store = NodeStore::new();
    let (dir, _) = dir_with(&mut store, &[10]);
    store.append_child_ref(dir.node(), Ref::NULL).unwrap();
    assert!(matches!(dir.verify(&store), Err(BlobError::Corrupt { .. })));
}

#[test]
fn verify_rejects_unflagged_directory() {
    let mut store = NodeStore::new();
    let r = store.alloc(NodeKind::Refs, false).unwrap();
    let child = leaf_ref(&mut store, b"abc");
    store.append_child_ref(r, child).unwrap();
    assert!(matches!(
        Dir::from_ref(r).verify(&store),
        Err(BlobError::Corrupt { .. })
    ));
}

#[test]
fn verify_rejects_nested_directory() {
    let mut store = NodeStore::new();
    let (inner, _) = dir_with(&mut store, &[10, 2]);
    let outer = Dir::create(&mut store).unwrap();
    store.append_child_ref(outer.node(), inner.node()).unwrap();
    assert!(matches!(outer.verify(&store), Err(BlobError::Corrupt { .. })));
}

#[test]
fn verify_reports_the_corrupt_child() {
    let mut store = NodeStore::new();
    let (dir, _) = dir_with(&mut store, &[10, 4]);
    let child = store.child_ref(dir.node(), 1).unwrap();
    // a byte node tagged as a directory
    store.set_context_flag(child, true).unwrap();
    match dir.verify(&store) {
        Err(BlobError::Corrupt { node, .. }) => assert_eq!(node, child),
        other => panic!("expected corruption, got {:?}", other),
    }
}
