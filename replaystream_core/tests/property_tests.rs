//! Property tests for replay identity, exactly-once reads and tee duplication

use proptest::prelude::*;
use replaystream_core::*;
use replaystream_test_utils::{MockSink, MockSource};
use tempfile::TempDir;

fn read_all<S: ByteSource>(source: &mut S, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = source.read(&mut buf).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

proptest! {
    #[test]
    fn test_replay_round_trip_identity(
        data in proptest::collection::vec(any::<u8>(), 0..4096),
        prefix in 0usize..4096,
        max_read in 1usize..512,
        chunk in 1usize..700,
        threshold in 1usize..2048,
    ) {
        let dir = TempDir::new().unwrap();
        let config = ReplayConfig {
            threshold: Some(threshold),
            spill_dir: Some(dir.path().to_path_buf()),
            ..ReplayConfig::default()
        };
        let source = MockSource::new(data.clone()).with_max_read(max_read);
        let probe = source.probe();
        let mut replay = ReplayBuffer::new(source, &config).unwrap();

        replay.mark(MarkLimit::Unlimited).unwrap();
        let mut head = vec![0u8; prefix.min(data.len())];
        replay.read_full(&mut head).unwrap();
        replay.reset().unwrap();

        let all = read_all(&mut replay, chunk);
        prop_assert_eq!(&all, &data);
        prop_assert_eq!(probe.bytes_pulled(), data.len() as u64);

        replay.close().unwrap();
        prop_assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

proptest! {
    #[test]
    fn test_tee_forwards_each_byte_once(
        data in proptest::collection::vec(any::<u8>(), 0..2048),
        rewinds in proptest::collection::vec(0usize..2048, 0..5),
        chunk in 1usize..300,
    ) {
        let replay =
            ReplayBuffer::new(MockSource::new(data.clone()), &ReplayConfig::default()).unwrap();
        let sink = MockSink::new();
        let mut tee =
            TeeDuplicator::new(replay, vec![Box::new(sink.clone())], &TeeConfig::default())
                .unwrap();

        for length in rewinds {
            tee.mark(MarkLimit::Unlimited).unwrap();
            let mut buf = vec![0u8; length];
            tee.read_full(&mut buf).unwrap();
            tee.reset().unwrap();
        }
        let all = read_all(&mut tee, chunk);
        tee.close().unwrap();

        prop_assert_eq!(&all, &data);
        prop_assert_eq!(sink.contents(), data);
    }
}

proptest! {
    #[test]
    fn test_marker_source_matches_extract(
        data in proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'c')], 0..256),
        start in proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b')], 0..3),
        stop in proptest::collection::vec(prop_oneof![Just(b'b'), Just(b'c')], 0..3),
        max_read in 1usize..16,
    ) {
        let expected = extract(&data, &start, &stop);
        let source = MockSource::new(data.clone()).with_max_read(max_read);
        let mut extractor = MarkerExtractor::new(source, &start, &stop);
        prop_assert_eq!(read_all(&mut extractor, 7), expected);
    }
}
