//! Mock byte source with observable counters

use replaystream_core::{ByteSource, Result, error::IoError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Counters {
    bytes_pulled: AtomicU64,
    reads: AtomicU64,
    closes: AtomicUsize,
}

/// Handle that observes a [`MockSource`] after it was moved into a decorator
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    counters: Arc<Counters>,
}

impl SourceProbe {
    /// Bytes handed out by the source
    pub fn bytes_pulled(&self) -> u64 {
        self.counters.bytes_pulled.load(Ordering::SeqCst)
    }

    /// Calls to `read`, including end-of-data reads
    pub fn reads(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Calls to `close`
    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

/// In-memory source that can serve short reads and fail on demand
pub struct MockSource {
    data: Vec<u8>,
    position: usize,
    max_read: usize,
    fail_at: Option<usize>,
    fail_on_close: bool,
    counters: Arc<Counters>,
}

impl MockSource {
    /// Serve `data`
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
            max_read: usize::MAX,
            fail_at: None,
            fail_on_close: false,
            counters: Arc::default(),
        }
    }

    /// Return at most `max_read` bytes per read
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read.max(1);
        self
    }

    /// Fail the first read that would cross `offset`
    pub fn failing_at(mut self, offset: usize) -> Self {
        self.fail_at = Some(offset);
        self
    }

    /// Fail `close`
    pub fn failing_close(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    /// Handle for inspecting the counters later
    pub fn probe(&self) -> SourceProbe {
        SourceProbe {
            counters: Arc::clone(&self.counters),
        }
    }
}

impl ByteSource for MockSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);

        let remaining = self.data.len() - self.position;
        let mut n = buf.len().min(remaining).min(self.max_read);
        if let Some(offset) = self.fail_at {
            if self.position >= offset {
                return Err(IoError::read_failed(
                    "mock",
                    std::io::Error::other("injected read failure"),
                )
                .into());
            }
            n = n.min(offset - self.position);
        }

        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        self.counters.bytes_pulled.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_close {
            return Err(IoError::read_failed(
                "mock",
                std::io::Error::other("injected close failure"),
            )
            .into());
        }
        Ok(())
    }

    fn layer(&self) -> &'static str {
        "mock"
    }
}
