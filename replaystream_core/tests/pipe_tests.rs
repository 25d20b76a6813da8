//! Pipe bridge fidelity, failure propagation and cancellation

use replaystream_core::error::{ProducerError, ProtocolError};
use replaystream_core::*;
use replaystream_test_utils::TestDataBuilder;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

fn config(buffer_size: usize, chunk_size: usize) -> PipeConfig {
    PipeConfig {
        buffer_size,
        chunk_size,
        ..PipeConfig::default()
    }
}

#[test]
fn test_large_payload_arrives_intact() {
    let data = TestDataBuilder::new().seeded(3 * 1024 * 1024 + 17, 42).build();
    let expected = data.clone();

    let mut pipe = PipeBridge::spawn(&config(64 * 1024, 8 * 1024), move |writer| {
        for chunk in data.chunks(10_007) {
            writer.write_all(chunk)?;
        }
        Ok(writer.bytes_written())
    })
    .unwrap();

    let mut out = Vec::new();
    pipe.read_to_end(&mut out).unwrap();
    assert_eq!(out.len(), expected.len());
    assert!(out == expected);

    pipe.close().unwrap();
    assert_eq!(pipe.result().unwrap(), expected.len() as u64);
}

#[test]
fn test_writer_usable_as_std_write() {
    use std::io::Write;

    let mut pipe = PipeBridge::spawn(&PipeConfig::default(), |writer| {
        write!(writer, "{}-{}", "left", 42)?;
        Ok(())
    })
    .unwrap();

    let mut out = Vec::new();
    pipe.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"left-42");
}

#[test]
fn test_failure_after_partial_output() {
    let mut pipe = PipeBridge::<()>::spawn(&config(8, 4), |writer| {
        writer.write_all(b"0123456789")?;
        Err(std::io::Error::other("upstream dropped").into())
    })
    .unwrap();

    let mut got = Vec::new();
    let mut buf = [0u8; 3];
    let err = loop {
        match pipe.read(&mut buf) {
            Ok(0) => panic!("end-of-data must carry the producer failure"),
            Ok(n) => got.extend_from_slice(&buf[..n]),
            Err(e) => break e,
        }
    };

    assert_eq!(got, b"0123456789");
    assert!(matches!(err, Error::Producer(ProducerError::Failed { .. })));
    assert!(err.to_string().contains("upstream dropped"));
}

#[test]
fn test_cancellation_unblocks_producer() {
    let observed_failure = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&observed_failure);
    let pipe_config = PipeConfig {
        join_on_close: true,
        ..config(1024, 256)
    };

    let mut pipe = PipeBridge::<()>::spawn(&pipe_config, move |writer| {
        let block = [0u8; 4096];
        loop {
            if let Err(e) = writer.write_all(&block) {
                flag.store(e.is_broken_pipe(), Ordering::SeqCst);
                return Err(e);
            }
        }
    })
    .unwrap();

    let mut buf = [0u8; 512];
    pipe.read_full(&mut buf).unwrap();

    let started = Instant::now();
    pipe.close().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(observed_failure.load(Ordering::SeqCst));

    let err = pipe.result().unwrap_err();
    assert!(matches!(err, Error::Producer(_)));
}

#[test]
fn test_close_without_join_still_ends_producer() {
    let pipe_config = PipeConfig {
        join_on_close: false,
        ..config(1024, 256)
    };

    let mut pipe = PipeBridge::<()>::spawn(&pipe_config, |writer| {
        let block = [7u8; 4096];
        loop {
            writer.write_all(&block)?;
        }
    })
    .unwrap();

    let mut buf = [0u8; 512];
    pipe.read_full(&mut buf).unwrap();

    let started = Instant::now();
    pipe.close().unwrap();
    let err = pipe.result().unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));

    match err {
        Error::Producer(failure) => {
            assert!(failure.cause().is_some_and(Error::is_broken_pipe));
        }
        other => panic!("Expected a producer failure, got {other:?}"),
    }
    assert!(pipe.is_finished());
}

#[test]
fn test_result_contract() {
    let mut pipe = PipeBridge::spawn(&PipeConfig::default(), |_writer| Ok(vec![1, 2, 3])).unwrap();

    assert!(matches!(
        pipe.result(),
        Err(Error::Protocol(ProtocolError::ResultBeforeClose))
    ));

    pipe.close().unwrap();
    assert_eq!(pipe.result().unwrap(), vec![1, 2, 3]);
    assert!(matches!(
        pipe.result(),
        Err(Error::Protocol(ProtocolError::ResultAlreadyTaken))
    ));
}

#[test]
fn test_panicking_producer_is_reported() {
    let mut pipe = PipeBridge::<()>::spawn(&PipeConfig::default(), |_writer| {
        panic!("producer bug");
    })
    .unwrap();

    pipe.close().unwrap();
    let err = pipe.result().unwrap_err();
    assert!(matches!(err, Error::Producer(ProducerError::Vanished)));
}

#[test]
fn test_pool_strategy_from_config_inside_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let pipe_config = PipeConfig {
        strategy: StrategyKind::Pool,
        ..PipeConfig::default()
    };
    let mut pipe = PipeBridge::spawn(&pipe_config, |writer| {
        writer.write_all(b"pooled")?;
        Ok(())
    })
    .unwrap();

    let mut out = Vec::new();
    pipe.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"pooled");
    pipe.close().unwrap();
    pipe.result().unwrap();
}

#[test]
fn test_zero_chunk_size_rejected() {
    let result = PipeBridge::spawn(&config(16, 0), |_writer| Ok(()));
    assert!(matches!(result, Err(Error::Validation(_))));
}
