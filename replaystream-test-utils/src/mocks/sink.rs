//! Mock byte sink

use replaystream_core::{ByteSink, Result, error::IoError};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct SinkState {
    data: Vec<u8>,
    writes: usize,
    closes: usize,
}

/// Recording sink that can reject writes past a byte budget
///
/// Clones share state, so a test keeps one clone while a decorator owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    state: Arc<Mutex<SinkState>>,
    fail_after: Option<usize>,
}

impl MockSink {
    /// Create an accepting sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any write that would take the total past `limit` bytes
    pub fn failing_after(limit: usize) -> Self {
        Self {
            fail_after: Some(limit),
            ..Self::default()
        }
    }

    /// Everything accepted so far
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().unwrap().data.clone()
    }

    /// Number of accepted writes
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// Calls to `close`
    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

impl ByteSink for MockSink {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if state.data.len() + data.len() > limit {
                return Err(IoError::write_failed(
                    "mock",
                    std::io::Error::other("injected write failure"),
                )
                .into());
            }
        }
        state.data.extend_from_slice(data);
        state.writes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}
