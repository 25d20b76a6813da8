//! Byte source and byte sink contracts
//!
//! Every decorator in this crate implements [`ByteSource`] so layers compose in
//! any order, e.g. a marker extractor over a tee over a replay buffer over a
//! pipe. Adapters bridge to and from `std::io::Read` / `std::io::Write`.

use crate::error::{IoError, ProtocolError, ValidationError};
use crate::{Error, Result};
use log::trace;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// Default chunk size used when pumping or draining streams (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// How long a bookmark must stay replayable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkLimit {
    /// Replay is guaranteed no matter how many bytes are read after the mark
    Unlimited,
    /// Discard every held byte; a later reset fails
    Invalidate,
    /// Replay is guaranteed for at most this many bytes past the mark
    Bytes(u64),
}

impl MarkLimit {
    /// Map an integer limit (`< 0` unlimited, `0` invalidate, `> 0` bytes)
    pub fn from_raw(limit: i64) -> Self {
        match limit {
            l if l < 0 => Self::Unlimited,
            0 => Self::Invalidate,
            l => Self::Bytes(l as u64),
        }
    }
}

/// A sequential, optionally replayable, byte producer
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes; `Ok(0)` signals end-of-data
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Whether `mark` / `reset` are available
    fn mark_supported(&self) -> bool {
        false
    }

    /// Bookmark the current position
    fn mark(&mut self, limit: MarkLimit) -> Result<()> {
        let _ = limit;
        Err(ProtocolError::mark_not_supported(self.layer()).into())
    }

    /// Rewind to the last bookmark
    fn reset(&mut self) -> Result<()> {
        Err(ProtocolError::mark_not_supported(self.layer()).into())
    }

    /// Release resources held by this source
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Short name used in error messages and logs
    fn layer(&self) -> &'static str {
        "source"
    }

    /// Read until `buf` is full or the source ends; returns the bytes read
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Read everything that is left into a vector
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = vec![0u8; DEFAULT_CHUNK_SIZE];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }
}

/// A byte consumer
pub trait ByteSink: Send {
    /// Write every byte of `data`
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Flush buffered bytes
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flush and release the sink
    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn mark_supported(&self) -> bool {
        (**self).mark_supported()
    }

    fn mark(&mut self, limit: MarkLimit) -> Result<()> {
        (**self).mark(limit)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn layer(&self) -> &'static str {
        (**self).layer()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn mark_supported(&self) -> bool {
        (**self).mark_supported()
    }

    fn mark(&mut self, limit: MarkLimit) -> Result<()> {
        (**self).mark(limit)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn layer(&self) -> &'static str {
        (**self).layer()
    }
}

impl<S: ByteSink + ?Sized> ByteSink for Box<S> {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Forward-only source over any `std::io::Read`
pub struct ReaderSource<R> {
    reader: Option<R>,
}

impl<R: Read + Send> ReaderSource<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let reader = self
            .reader
            .as_mut()
            .ok_or(ProtocolError::closed("reader"))?;
        loop {
            match reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IoError::read_failed("reader", e).into()),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.reader.take();
        Ok(())
    }

    fn layer(&self) -> &'static str {
        "reader"
    }
}

/// Sink over any `std::io::Write`
pub struct WriterSink<W> {
    writer: Option<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Take the writer back, if the sink was not closed
    pub fn into_inner(self) -> Option<W> {
        self.writer
    }
}

impl<W: Write + Send> ByteSink for WriterSink<W> {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or(ProtocolError::closed("writer"))?;
        writer
            .write_all(data)
            .map_err(|e| IoError::write_failed("writer", e).into())
    }

    fn flush(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer
                .flush()
                .map_err(|e| IoError::write_failed("writer", e).into()),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        let result = self.flush();
        self.writer.take();
        result
    }
}

/// Cloneable in-memory sink
///
/// Clones share one buffer, so a test (or caller) can keep a handle while a
/// decorator owns another.
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    buffer: Arc<Mutex<Vec<u8>>>,
    closed: Arc<Mutex<bool>>,
}

impl SharedSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `close` was called on any clone
    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(false)
    }
}

impl ByteSink for SharedSink {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::closed("shared sink").into());
        }
        let mut buffer = self.buffer.lock().map_err(|_| poisoned())?;
        buffer.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut closed = self.closed.lock().map_err(|_| poisoned())?;
        *closed = true;
        Ok(())
    }
}

fn poisoned() -> Error {
    Error::from(std::io::Error::other("shared sink lock poisoned"))
}

/// Exposes a [`ByteSource`] as `std::io::Read`
pub struct SourceReader<S> {
    source: S,
}

impl<S: ByteSource> SourceReader<S> {
    /// Wrap a source
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Borrow the wrapped source
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Unwrap the source
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: ByteSource> Read for SourceReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.source.read(buf).map_err(std::io::Error::from)
    }
}

/// Copy `source` into `sink` until end-of-data; returns the byte count
pub fn pump<S, K>(source: &mut S, sink: &mut K, chunk_size: usize) -> Result<u64>
where
    S: ByteSource + ?Sized,
    K: ByteSink + ?Sized,
{
    if chunk_size == 0 {
        return Err(
            ValidationError::invalid_parameter("chunk_size", "must be greater than zero").into(),
        );
    }

    let mut chunk = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        let n = source.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        sink.write_all(&chunk[..n])?;
        total += n as u64;
    }
    sink.flush()?;
    trace!("Pumped {total} bytes from {}", source.layer());
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_mark_limit_from_raw() {
        assert_eq!(MarkLimit::from_raw(-1), MarkLimit::Unlimited);
        assert_eq!(MarkLimit::from_raw(0), MarkLimit::Invalidate);
        assert_eq!(MarkLimit::from_raw(42), MarkLimit::Bytes(42));
    }

    #[test]
    fn test_reader_source_reads_and_closes() {
        let mut source = ReaderSource::new(Cursor::new(b"hello".to_vec()));
        let mut out = Vec::new();

        assert_eq!(source.read_to_end(&mut out).unwrap(), 5);
        assert_eq!(out, b"hello");

        source.close().unwrap();
        let err = source.read(&mut [0u8; 4]).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_reader_source_has_no_mark() {
        let mut source = ReaderSource::new(Cursor::new(Vec::new()));

        assert!(!source.mark_supported());
        let err = source.mark(MarkLimit::Unlimited).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MarkNotSupported { layer: "reader" })
        ));
        assert!(source.reset().is_err());
    }

    #[test]
    fn test_read_full_spans_short_reads() {
        struct OneByte(Vec<u8>);
        impl ByteSource for OneByte {
            fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }

        let mut source = OneByte(b"abcdef".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(source.read_full(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(source.read_full(&mut buf).unwrap(), 2);
    }

    #[test]
    fn test_shared_sink_clones_share_buffer() {
        let sink = SharedSink::new();
        let mut writer = sink.clone();

        writer.write_all(b"abc").unwrap();
        writer.write_all(b"def").unwrap();
        assert_eq!(sink.contents(), b"abcdef");
        assert_eq!(sink.len(), 6);

        writer.close().unwrap();
        assert!(sink.is_closed());
        assert!(writer.write_all(b"x").is_err());
    }

    #[test]
    fn test_writer_sink_close_flushes_and_releases() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_all(b"data").unwrap();
        sink.close().unwrap();

        assert!(sink.write_all(b"more").is_err());
        assert!(sink.into_inner().is_none());
    }

    #[test]
    fn test_source_reader_bridges_to_std() {
        let source = ReaderSource::new(Cursor::new(b"bridge".to_vec()));
        let mut reader = SourceReader::new(source);
        let mut out = String::new();

        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "bridge");
    }

    #[test]
    fn test_pump_copies_everything() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut source = ReaderSource::new(Cursor::new(data.clone()));
        let mut sink = SharedSink::new();

        let copied = pump(&mut source, &mut sink, 333).unwrap();
        assert_eq!(copied, 10_000);
        assert_eq!(sink.contents(), data);
    }

    #[test]
    fn test_pump_rejects_zero_chunk() {
        let mut source = ReaderSource::new(Cursor::new(Vec::new()));
        let mut sink = SharedSink::new();

        assert!(matches!(
            pump(&mut source, &mut sink, 0),
            Err(Error::Validation(_))
        ));
    }
}
