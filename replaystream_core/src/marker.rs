//! Marker extraction
//!
//! Yields only the bytes enclosed between a start marker and a stop marker,
//! markers excluded. After a stop marker the extractor looks for the next
//! start marker, so every enclosed region is yielded in order. A region still
//! open at end-of-data is yielded up to the end, including any partial stop
//! marker.

use crate::Result;
use crate::error::{ProtocolError, ValidationError};
use crate::source::{ByteSource, DEFAULT_CHUNK_SIZE};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Marker configuration
///
/// Markers are UTF-8 strings here; the extractor itself takes raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Opens a region; empty means the data starts inside a region
    pub start: String,
    /// Closes a region; empty means the region runs to end-of-data
    pub stop: String,
    /// Stop after the first region
    pub single_pair: bool,
}

impl MarkerConfig {
    /// Markers for `start`..`stop`
    pub fn new(start: &str, stop: &str) -> Self {
        Self {
            start: start.to_string(),
            stop: stop.to_string(),
            single_pair: false,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.start.is_empty() && self.stop.is_empty() && self.single_pair {
            return Err(ValidationError::invalid_configuration(
                "single_pair needs at least one marker",
            )
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Seeking,
    Copying,
    Done,
}

/// The extraction state machine, fed one byte at a time
#[derive(Debug)]
struct Scanner {
    start: Vec<u8>,
    stop: Vec<u8>,
    single_pair: bool,
    state: State,
    /// Seeking: candidate start marker. Copying: bytes withheld because they
    /// may begin the stop marker. Done: flushed tail.
    window: VecDeque<u8>,
    regions: u64,
}

impl Scanner {
    fn new(start: &[u8], stop: &[u8], single_pair: bool) -> Self {
        let state = if start.is_empty() {
            State::Copying
        } else {
            State::Seeking
        };
        Self {
            start: start.to_vec(),
            stop: stop.to_vec(),
            single_pair,
            state,
            window: VecDeque::with_capacity(start.len().max(stop.len())),
            regions: 0,
        }
    }

    fn step(&mut self, byte: u8) -> Option<u8> {
        match self.state {
            State::Seeking => {
                self.window.push_back(byte);
                if self.window.len() > self.start.len() {
                    self.window.pop_front();
                }
                if self.window.iter().eq(self.start.iter()) {
                    trace!("Start marker found");
                    self.window.clear();
                    self.state = State::Copying;
                }
                None
            }
            State::Copying if self.stop.is_empty() => Some(byte),
            State::Copying => {
                self.window.push_back(byte);
                if self.window.len() < self.stop.len() {
                    return None;
                }
                if self.window.iter().eq(self.stop.iter()) {
                    self.window.clear();
                    self.end_region();
                    None
                } else {
                    self.window.pop_front()
                }
            }
            State::Done => None,
        }
    }

    fn end_region(&mut self) {
        self.regions += 1;
        trace!("Stop marker found, {} regions so far", self.regions);
        self.state = if self.single_pair {
            State::Done
        } else if self.start.is_empty() {
            State::Copying
        } else {
            State::Seeking
        };
    }

    /// End-of-data: an open region keeps its withheld bytes as payload
    fn finish(&mut self) {
        if self.state == State::Seeking {
            self.window.clear();
        }
        if self.state != State::Done {
            debug!("Marker extraction finished after {} regions", self.regions);
        }
        self.state = State::Done;
    }

    fn take_tail(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.window.len());
        for (slot, byte) in out.iter_mut().zip(self.window.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

/// Source decorator yielding only the bytes between markers
pub struct MarkerExtractor<S> {
    source: S,
    scanner: Scanner,
    input: Vec<u8>,
    input_pos: usize,
    input_len: usize,
    closed: bool,
}

impl<S: ByteSource> MarkerExtractor<S> {
    /// Extract the regions of `source` enclosed by `start` and `stop`
    pub fn new(source: S, start: &[u8], stop: &[u8]) -> Self {
        Self::build(source, Scanner::new(start, stop, false))
    }

    /// Build from a [`MarkerConfig`]
    pub fn from_config(source: S, config: &MarkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(
            source,
            Scanner::new(config.start.as_bytes(), config.stop.as_bytes(), config.single_pair),
        ))
    }

    /// Stop after the first region
    pub fn single_pair(mut self) -> Self {
        self.scanner.single_pair = true;
        self
    }

    fn build(source: S, scanner: Scanner) -> Self {
        Self {
            source,
            scanner,
            input: vec![0u8; DEFAULT_CHUNK_SIZE],
            input_pos: 0,
            input_len: 0,
            closed: false,
        }
    }

    /// Number of complete regions seen so far
    pub fn regions(&self) -> u64 {
        self.scanner.regions
    }

    /// Whether extraction has reached its end
    pub fn is_done(&self) -> bool {
        self.scanner.state == State::Done && self.scanner.window.is_empty()
    }
}

impl<S: ByteSource> ByteSource for MarkerExtractor<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(ProtocolError::closed("marker").into());
        }

        let mut filled = 0;
        while filled < buf.len() {
            if self.scanner.state == State::Done {
                filled += self.scanner.take_tail(&mut buf[filled..]);
                break;
            }
            if self.input_pos == self.input_len {
                // Hand back what we have before blocking on the source again.
                if filled > 0 {
                    break;
                }
                self.input_len = self.source.read(&mut self.input)?;
                self.input_pos = 0;
                if self.input_len == 0 {
                    self.scanner.finish();
                    continue;
                }
            }

            let byte = self.input[self.input_pos];
            self.input_pos += 1;
            if let Some(out) = self.scanner.step(byte) {
                buf[filled] = out;
                filled += 1;
            }
        }
        Ok(filled)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.source.close()
    }

    fn layer(&self) -> &'static str {
        "marker"
    }
}

/// Extract the regions of `data` enclosed by `start` and `stop`
pub fn extract(data: &[u8], start: &[u8], stop: &[u8]) -> Vec<u8> {
    let mut scanner = Scanner::new(start, stop, false);
    let mut out: Vec<u8> = data.iter().filter_map(|&b| scanner.step(b)).collect();
    scanner.finish();
    out.extend(scanner.window.drain(..));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReaderSource;
    use std::io::Cursor;

    fn extractor(
        data: &[u8],
        start: &str,
        stop: &str,
    ) -> MarkerExtractor<ReaderSource<Cursor<Vec<u8>>>> {
        MarkerExtractor::new(
            ReaderSource::new(Cursor::new(data.to_vec())),
            start.as_bytes(),
            stop.as_bytes(),
        )
    }

    #[test]
    fn test_extract_every_region() {
        assert_eq!(extract(b"01st23en45st67en st89", b"st", b"en"), b"236789");
    }

    #[test]
    fn test_extract_flushes_partial_stop_marker() {
        assert_eq!(extract(b"0123456789", b"0", b"890"), b"123456789");
    }

    #[test]
    fn test_extract_empty_stop_runs_to_end() {
        assert_eq!(extract(b"012345678", b"67", b""), b"8");
    }

    #[test]
    fn test_extract_without_start_marker_yields_nothing() {
        assert!(extract(b"no markers here", b"<<", b">>").is_empty());
    }

    #[test]
    fn test_extract_empty_start_copies_from_beginning() {
        assert_eq!(extract(b"abc|def", b"", b"|"), b"abcdef");
    }

    #[test]
    fn test_overlapping_stop_candidate() {
        assert_eq!(extract(b"[aeeen]", b"[a", b"en"), b"ee");
    }

    #[test]
    fn test_source_matches_extract_with_tiny_reads() {
        let data = b"01st23en45st67en st89";
        let mut source = extractor(data, "st", "en");

        let mut out = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            let n = source.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"236789");
        assert_eq!(source.regions(), 2);
        assert!(source.is_done());
        // Done is sticky.
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_single_pair_stops_after_first_region() {
        let mut source = extractor(b"<a>1</a><a>2</a>", "<a>", "</a>").single_pair();
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"1");
    }

    #[test]
    fn test_from_config() {
        let config = MarkerConfig {
            single_pair: true,
            ..MarkerConfig::new("st", "en")
        };
        let mut source = MarkerExtractor::from_config(
            ReaderSource::new(Cursor::new(b"st12en st34en".to_vec())),
            &config,
        )
        .unwrap();

        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"12");
    }

    #[test]
    fn test_marker_has_no_mark_support() {
        let mut source = extractor(b"abc", "a", "c");
        assert!(!source.mark_supported());
        assert!(source.mark(crate::source::MarkLimit::Unlimited).is_err());
    }

    #[test]
    fn test_single_pair_without_markers_is_rejected() {
        let config = MarkerConfig {
            single_pair: true,
            ..MarkerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
