//! Close-once and close-shield decorators
//!
//! Several decorators release resources in `close` (spill files, sinks,
//! producer tasks) and must do so exactly once; others hand a sink to a
//! consumer that must not close it.

use crate::Result;
use crate::source::{ByteSink, ByteSource, MarkLimit};
use log::trace;

/// Forwards the first `close`; later calls are no-ops
#[derive(Debug)]
pub struct CloseOnce<T> {
    inner: T,
    closed: bool,
}

impl<T> CloseOnce<T> {
    /// Wrap `inner`
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    /// Whether `close` has been forwarded
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Borrow the wrapped value
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the wrapped value
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwrap
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<S: ByteSource> ByteSource for CloseOnce<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }

    fn mark_supported(&self) -> bool {
        self.inner.mark_supported()
    }

    fn mark(&mut self, limit: MarkLimit) -> Result<()> {
        self.inner.mark(limit)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        // Marked first: a failing close is not retried.
        self.closed = true;
        self.inner.close()
    }

    fn layer(&self) -> &'static str {
        self.inner.layer()
    }
}

impl<K: ByteSink> ByteSink for CloseOnce<K> {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}

/// Never forwards `close`
///
/// Sinks are flushed instead so written bytes still reach the wrapped writer.
#[derive(Debug)]
pub struct CloseShield<T> {
    inner: T,
}

impl<T> CloseShield<T> {
    /// Wrap `inner`
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Mutably borrow the wrapped value
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwrap
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<S: ByteSource> ByteSource for CloseShield<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }

    fn mark_supported(&self) -> bool {
        self.inner.mark_supported()
    }

    fn mark(&mut self, limit: MarkLimit) -> Result<()> {
        self.inner.mark(limit)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    fn close(&mut self) -> Result<()> {
        trace!("Suppressed close of {}", self.inner.layer());
        Ok(())
    }

    fn layer(&self) -> &'static str {
        self.inner.layer()
    }
}

impl<K: ByteSink> ByteSink for CloseShield<K> {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SharedSink;

    #[derive(Default)]
    struct CountingClose {
        closes: usize,
    }

    impl ByteSource for CountingClose {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn close(&mut self) -> Result<()> {
            self.closes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_close_once_forwards_first_close_only() {
        let mut source = CloseOnce::new(CountingClose::default());

        source.close().unwrap();
        source.close().unwrap();
        source.close().unwrap();

        assert!(source.is_closed());
        assert_eq!(source.get_ref().closes, 1);
    }

    #[test]
    fn test_close_shield_suppresses_source_close() {
        let mut source = CloseShield::new(CountingClose::default());

        source.close().unwrap();
        assert_eq!(source.get_mut().closes, 0);
    }

    #[test]
    fn test_close_shield_keeps_sink_open() {
        let sink = SharedSink::new();
        let mut shielded = CloseShield::new(sink.clone());

        shielded.write_all(b"abc").unwrap();
        shielded.close().unwrap();

        assert!(!sink.is_closed());
        assert_eq!(sink.contents(), b"abc");
    }

    #[test]
    fn test_close_once_sink() {
        let sink = SharedSink::new();
        let mut once = CloseOnce::new(sink.clone());

        once.write_all(b"x").unwrap();
        once.close().unwrap();
        once.close().unwrap();
        assert!(sink.is_closed());
    }
}
