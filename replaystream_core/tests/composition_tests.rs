//! Decorators stacked in different orders

use replaystream_core::*;
use replaystream_test_utils::{MockSink, MockSource, TestDataBuilder};
use std::io::Read;
use tempfile::TempDir;

#[test]
fn test_pipe_replay_tee_marker_stack() {
    let dir = TempDir::new().unwrap();
    let document = TestDataBuilder::new()
        .bytes(b"header ")
        .region(b"<data>", b"first", b"</data>")
        .seeded(20_000, 5)
        .region(b"<data>", b"second", b"</data>")
        .build();
    let expected_copy = document.clone();

    let pipe = PipeBridge::spawn(&PipeConfig::default(), move |writer| {
        for chunk in document.chunks(999) {
            writer.write_all(chunk)?;
        }
        Ok(())
    })
    .unwrap();

    let replay_config = ReplayConfig {
        threshold: Some(4096),
        spill_dir: Some(dir.path().to_path_buf()),
        ..ReplayConfig::default()
    };
    let replay = ReplayBuffer::new(pipe, &replay_config).unwrap();
    let copy = MockSink::new();
    let mut tee = TeeDuplicator::new(replay, vec![Box::new(copy.clone())], &TeeConfig::default())
        .unwrap();

    // Peek at the header, then rewind.
    tee.mark(MarkLimit::Bytes(16)).unwrap();
    let mut header = [0u8; 7];
    tee.read_full(&mut header).unwrap();
    assert_eq!(&header, b"header ");
    tee.reset().unwrap();

    let registry = StatsRegistry::new();
    let mut probe = StatsProbe::with_registry(
        MarkerExtractor::new(&mut tee, b"<data>", b"</data>"),
        &registry,
    );
    let mut extracted = Vec::new();
    probe.read_to_end(&mut extracted).unwrap();
    drop(probe);
    tee.close().unwrap();

    assert_eq!(extracted, b"firstsecond");
    assert_eq!(copy.contents(), expected_copy);
    assert_eq!(registry.sites()[0].bytes, 11);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_close_once_wrapped_stack_closes_source_once() {
    let source = MockSource::new(*b"abc");
    let probe = source.probe();
    let replay = ReplayBuffer::new(source, &ReplayConfig::default()).unwrap();
    let mut outer = CloseOnce::new(StatsProbe::with_registry(replay, &StatsRegistry::new()));

    outer.close().unwrap();
    outer.close().unwrap();
    assert_eq!(probe.closes(), 1);
}

#[test]
fn test_source_reader_feeds_std_consumers() {
    let replay = ReplayBuffer::new(MockSource::new(*b"through std::io"), &ReplayConfig::default())
        .unwrap();
    let mut reader = SourceReader::new(replay);

    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    assert_eq!(text, "through std::io");
}

#[test]
fn test_pump_extracted_regions() {
    let sink = SharedSink::new();
    let mut source =
        MarkerExtractor::new(MockSource::new(*b"a{b}c{d}e").with_max_read(2), b"{", b"}");
    let mut out = sink.clone();

    let copied = pump(&mut source, &mut out, 3).unwrap();
    assert_eq!(copied, 2);
    assert_eq!(sink.contents(), b"bd");
}
