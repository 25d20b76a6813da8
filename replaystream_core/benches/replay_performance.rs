//! Replay Performance Benchmarks
//!
//! Throughput of replay buffers below and above the spill threshold, and of
//! the pipe bridge handing bytes across threads.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use replaystream_core::{
    ByteSource, MarkLimit, PipeBridge, PipeConfig, ReaderSource, ReplayBuffer, ReplayConfig,
};
use std::hint::black_box;
use std::io::Cursor;

const PAYLOAD: usize = 4 * 1024 * 1024;

fn payload() -> Vec<u8> {
    (0..PAYLOAD).map(|i| (i % 251) as u8).collect()
}

fn drain<S: ByteSource>(source: &mut S, buf: &mut [u8]) -> usize {
    let mut total = 0;
    loop {
        let n = source.read(buf).unwrap();
        if n == 0 {
            return total;
        }
        total += n;
    }
}

/// Mark, read everything, reset and read it again
fn bench_replay_threshold(c: &mut Criterion) {
    let data = payload();
    let mut group = c.benchmark_group("replay_threshold");
    group.throughput(Throughput::Bytes((PAYLOAD * 2) as u64));

    // Headroom, exactly at the threshold, early spill
    for &threshold in &[PAYLOAD * 2, PAYLOAD, 256 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("mark_read_reset_read", format_size(threshold)),
            &threshold,
            |b, &threshold| {
                let config = ReplayConfig {
                    threshold: Some(threshold),
                    ..ReplayConfig::default()
                };
                let mut buf = vec![0u8; 64 * 1024];
                b.iter(|| {
                    let source = ReaderSource::new(Cursor::new(data.clone()));
                    let mut replay = ReplayBuffer::new(source, &config).unwrap();
                    replay.mark(MarkLimit::Unlimited).unwrap();
                    black_box(drain(&mut replay, &mut buf));
                    replay.reset().unwrap();
                    black_box(drain(&mut replay, &mut buf));
                    replay.close().unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Unmarked reads should cost little more than the wrapped source
fn bench_replay_passthrough(c: &mut Criterion) {
    let data = payload();
    let mut group = c.benchmark_group("replay_passthrough");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));

    group.bench_function("unmarked", |b| {
        let mut buf = vec![0u8; 64 * 1024];
        b.iter(|| {
            let source = ReaderSource::new(Cursor::new(data.clone()));
            let mut replay = ReplayBuffer::new(source, &ReplayConfig::default()).unwrap();
            black_box(drain(&mut replay, &mut buf));
        });
    });

    group.finish();
}

/// Bytes handed from a producer thread to the caller
fn bench_pipe_bridge(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipe_bridge");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));

    for &chunk_size in &[4 * 1024, 64 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("chunk", format_size(chunk_size)),
            &chunk_size,
            |b, &chunk_size| {
                let config = PipeConfig {
                    chunk_size,
                    ..PipeConfig::default()
                };
                let mut buf = vec![0u8; 64 * 1024];
                b.iter(|| {
                    let data = payload();
                    let mut pipe = PipeBridge::spawn(&config, move |writer| {
                        use replaystream_core::ByteSink;
                        writer.write_all(&data)
                    })
                    .unwrap();
                    black_box(drain(&mut pipe, &mut buf));
                    pipe.close().unwrap();
                });
            },
        );
    }

    group.finish();
}

fn format_size(size: usize) -> String {
    if size >= 1_048_576 {
        format!("{}MB", size / 1_048_576)
    } else if size >= 1_024 {
        format!("{}KB", size / 1_024)
    } else {
        format!("{size}B")
    }
}

criterion_group!(
    benches,
    bench_replay_threshold,
    bench_replay_passthrough,
    bench_pipe_bridge
);

criterion_main!(benches);
