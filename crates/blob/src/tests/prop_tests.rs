use super::read_all;
use crate::*;
use node::NodeStore;
use proptest::prelude::*;

const CAP: usize = 10;

fn chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..25), 0..12)
}

proptest! {
    #[test]
    fn appends_round_trip(chunks in chunks()) {
        let mut store = NodeStore::new();
        let mut blob = Blob::<CAP>::create(&mut store).unwrap();
        let mut expected = Vec::new();
        for chunk in &chunks {
            blob.append(&mut store, chunk, false).unwrap();
            expected.extend_from_slice(chunk);
        }

        let (bytes, _) = read_all(&blob, &store);
        prop_assert_eq!(bytes, expected);
        prop_assert!(blob.verify(&store).is_ok());
    }

    #[test]
    fn directory_invariant_holds_after_appends(chunks in chunks()) {
        let mut store = NodeStore::new();
        let mut blob = Blob::<CAP>::create(&mut store).unwrap();
        let mut total = 0;
        for chunk in &chunks {
            blob.append(&mut store, chunk, false).unwrap();
            total += chunk.len();

            prop_assert_eq!(blob.mode(&store).unwrap() == Mode::Chunked, total > CAP);
            if total > CAP {
                let lens = blob.child_lengths(&store).unwrap();
                let (last, full) = lens.split_last().unwrap();
                prop_assert!(full.iter().all(|&len| len == CAP));
                prop_assert!(*last >= 1 && *last <= CAP);
                prop_assert_eq!(lens.iter().sum::<usize>(), total);
            }
            prop_assert_eq!(blob.logical_size(&store).unwrap(), total);
        }
    }

    #[test]
    fn segment_calls_match_child_count(data in prop::collection::vec(any::<u8>(), 1..120)) {
        let mut store = NodeStore::new();
        let blob = Blob::<CAP>::create_from(&mut store, &data).unwrap();
        let (_, calls) = read_all(&blob, &store);
        match blob.mode(&store).unwrap() {
            Mode::Flat => prop_assert_eq!(calls, 1),
            Mode::Chunked => prop_assert_eq!(calls, store.child_count(blob.root()).unwrap()),
        }
    }

    #[test]
    fn read_past_end_is_always_empty(
        data in prop::collection::vec(any::<u8>(), 0..60),
        beyond in 0usize..40,
    ) {
        let mut store = NodeStore::new();
        let blob = Blob::<CAP>::create_from(&mut store, &data).unwrap();
        let seg = blob.read_at(&store, data.len() + beyond).unwrap();
        prop_assert!(seg.data.is_empty());
        prop_assert_eq!(seg.next_pos, 0);
    }

    #[test]
    fn flat_replace_matches_vec_splice(
        initial in prop::collection::vec(any::<u8>(), 0..=CAP),
        begin_seed in any::<usize>(),
        end_seed in any::<usize>(),
        mut data in prop::collection::vec(any::<u8>(), 0..=CAP),
    ) {
        let begin = begin_seed % (initial.len() + 1);
        let end = begin + end_seed % (initial.len() - begin + 1);
        data.truncate(CAP - (initial.len() - (end - begin)));

        let mut store = NodeStore::new();
        let mut blob = Blob::<CAP>::create_from(&mut store, &initial).unwrap();
        blob.replace(&mut store, begin, end, &data, false).unwrap();

        let mut model = initial.clone();
        model.splice(begin..end, data.iter().copied());
        prop_assert_eq!(blob.mode(&store).unwrap(), Mode::Flat);
        prop_assert_eq!(blob.to_vec(&store).unwrap(), model);
    }
}
