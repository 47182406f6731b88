use super::{pattern, read_all};
use crate::*;
use node::NodeStore;
use std::io::{Read, Seek, SeekFrom};

type Small = Blob<10>;

// -------------------- Segment protocol --------------------

#[test]
fn segment_count_matches_physical_layout() {
    let mut store = NodeStore::new();
    let flat = Small::create_from(&mut store, b"abc").unwrap();
    let chunked = Small::create_from(&mut store, &pattern(31)).unwrap();

    assert_eq!(read_all(&flat, &store), (b"abc".to_vec(), 1));
    let (bytes, calls) = read_all(&chunked, &store);
    assert_eq!(bytes, pattern(31));
    assert_eq!(calls, 4);
}

#[test]
fn reads_past_end_are_empty_in_both_modes() {
    let mut store = NodeStore::new();
    let flat = Small::create_from(&mut store, b"abc").unwrap();
    let chunked = Small::create_from(&mut store, &pattern(12)).unwrap();

    for pos in [3, 4, 99] {
        let seg = flat.read_at(&store, pos).unwrap();
        assert!(seg.data.is_empty());
        assert_eq!(seg.next_pos, 0);
    }
    for pos in [12, 13, 99] {
        let seg = chunked.read_at(&store, pos).unwrap();
        assert!(seg.data.is_empty());
        assert_eq!(seg.next_pos, 0);
    }
}

#[test]
fn flat_read_at_offset_returns_suffix() {
    let mut store = NodeStore::new();
    let blob = Small::create_from(&mut store, b"abcdef").unwrap();
    let seg = blob.read_at(&store, 4).unwrap();
    assert_eq!(seg.data, b"ef");
    assert!(seg.is_final());
}

#[test]
fn read_range_crosses_segments() {
    let mut store = NodeStore::new();
    let data = pattern(23);
    let blob = Small::create_from(&mut store, &data).unwrap();

    assert_eq!(blob.read_range(&store, 7, 21).unwrap(), &data[7..21]);
    assert_eq!(blob.read_range(&store, 23, 23).unwrap(), b"");
    assert!(matches!(
        blob.read_range(&store, 5, 24),
        Err(BlobError::RangeOutOfBounds { begin: 5, end: 24, len: 23 })
    ));
}

// -------------------- Segments iterator --------------------

#[test]
fn segments_follow_child_lengths() {
    let mut store = NodeStore::new();
    let blob = Small::create_from(&mut store, &pattern(23)).unwrap();
    let lens: Vec<usize> = blob
        .segments(&store)
        .map(|s| s.unwrap().len())
        .collect();
    assert_eq!(lens, vec![10, 10, 3]);
    assert_eq!(lens, blob.child_lengths(&store).unwrap());
}

#[test]
fn segments_of_empty_blob_yield_nothing() {
    let mut store = NodeStore::new();
    let blob = Small::create(&mut store).unwrap();
    assert_eq!(blob.segments(&store).count(), 0);
    assert_eq!(blob.to_vec(&store).unwrap(), b"");
    assert_eq!(blob.child_lengths(&store).unwrap(), vec![0]);
}

#[test]
fn segments_stop_at_first_error() {
    let store = NodeStore::new();
    let blob = Small::from_ref(node::Ref::from_raw(7));
    let mut segments = blob.segments(&store);
    assert!(matches!(segments.next(), Some(Err(BlobError::Node(_)))));
    assert!(segments.next().is_none());
}

// -------------------- io::Read / io::Seek --------------------

#[test]
fn reader_reads_everything() {
    let mut store = NodeStore::new();
    let data = pattern(47);
    let blob = Small::create_from(&mut store, &data).unwrap();

    let mut reader = blob.reader(&store).unwrap();
    assert_eq!(reader.len(), 47);
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert_eq!(reader.position(), 47);
}

#[test]
fn reader_never_crosses_a_segment_in_one_call() {
    let mut store = NodeStore::new();
    let blob = Small::create_from(&mut store, &pattern(23)).unwrap();
    let mut reader = blob.reader(&store).unwrap();
    let mut buf = [0u8; 64];

    assert_eq!(reader.read(&mut buf).unwrap(), 10);
    assert_eq!(reader.read(&mut buf).unwrap(), 10);
    assert_eq!(reader.read(&mut buf).unwrap(), 3);
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn reader_with_small_buffer() {
    let mut store = NodeStore::new();
    let data = pattern(23);
    let blob = Small::create_from(&mut store, &data).unwrap();
    let mut reader = blob.reader(&store).unwrap();

    let mut out = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
}

#[test]
fn reader_seeks() {
    let mut store = NodeStore::new();
    let data = pattern(23);
    let blob = Small::create_from(&mut store, &data).unwrap();
    let mut reader = blob.reader(&store).unwrap();
    let mut buf = [0u8; 4];

    assert_eq!(reader.seek(SeekFrom::Start(8)).unwrap(), 8);
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, &data[8..12]);

    assert_eq!(reader.seek(SeekFrom::Current(-2)).unwrap(), 10);
    assert_eq!(reader.seek(SeekFrom::End(-3)).unwrap(), 20);
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, &data[20..]);

    assert!(reader.seek(SeekFrom::Current(-100)).is_err());
    assert_eq!(reader.position(), 23);

    reader.seek(SeekFrom::Start(500)).unwrap();
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn reader_over_flat_blob() {
    let mut store = NodeStore::new();
    let blob = Small::create_from(&mut store, b"hello").unwrap();
    let mut s = String::new();
    blob.reader(&store).unwrap().read_to_string(&mut s).unwrap();
    assert_eq!(s, "hello");
}
