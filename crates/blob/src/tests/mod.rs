use crate::Blob;
use node::NodeStore;

mod directory_tests;
mod prop_tests;
mod reader_tests;

/// Drives the `read_at`/`next_pos` protocol from position 0. Returns the
/// concatenated bytes and the number of calls made.
fn read_all<const CAP: usize>(blob: &Blob<CAP>, store: &NodeStore) -> (Vec<u8>, usize) {
    let mut out = Vec::new();
    let mut calls = 0;
    let mut pos = 0;
    loop {
        let seg = blob.read_at(store, pos).unwrap();
        calls += 1;
        out.extend_from_slice(seg.data);
        if seg.next_pos == 0 {
            break;
        }
        pos = seg.next_pos;
    }
    (out, calls)
}

/// `len` bytes of a repeating alphabet, so offsets are easy to eyeball.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'A' + (i % 26) as u8).collect()
}
