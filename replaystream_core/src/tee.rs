//! Tee duplicator
//!
//! Every byte read from the source is also written, exactly once, to each
//! enabled sink. Replays after a `reset` are not forwarded again: the tee keeps
//! a high-water mark of what the sinks have already seen and only forwards the
//! bytes past it.

use crate::close::CloseShield;
use crate::error::{CleanupError, ProtocolError, ValidationError};
use crate::source::{ByteSink, ByteSource, DEFAULT_CHUNK_SIZE, MarkLimit};
use crate::{Error, Result};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

/// Tee configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeeConfig {
    /// Close the sinks when the tee is closed
    pub close_sinks: bool,
    /// Forward unread source bytes to the sinks on close
    pub drain_on_close: bool,
    /// Read size used while draining
    pub drain_chunk: usize,
}

impl Default for TeeConfig {
    fn default() -> Self {
        Self {
            close_sinks: true,
            drain_on_close: true,
            drain_chunk: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TeeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.drain_on_close && self.drain_chunk == 0 {
            return Err(ValidationError::invalid_parameter(
                "drain_chunk",
                "must be greater than zero",
            )
            .into());
        }
        Ok(())
    }
}

struct SinkSlot {
    sink: Box<dyn ByteSink>,
    enabled: bool,
}

/// Copies every byte read to a set of sinks
pub struct TeeDuplicator<S> {
    source: S,
    sinks: Vec<SinkSlot>,
    source_position: u64,
    destination_position: u64,
    mark_position: Option<u64>,
    config: TeeConfig,
    closed: bool,
}

impl<S: ByteSource> TeeDuplicator<S> {
    /// Duplicate `source` into `sinks`; at least one sink is required
    pub fn new(source: S, sinks: Vec<Box<dyn ByteSink>>, config: &TeeConfig) -> Result<Self> {
        config.validate()?;
        if sinks.is_empty() {
            return Err(ValidationError::invalid_parameter(
                "sinks",
                "at least one sink is required",
            )
            .into());
        }
        let mut tee = Self {
            source,
            sinks: Vec::with_capacity(sinks.len()),
            source_position: 0,
            destination_position: 0,
            mark_position: None,
            config: config.clone(),
            closed: false,
        };
        for sink in sinks {
            tee.add_sink(sink);
        }
        Ok(tee)
    }

    /// Attach another sink, enabled; returns its index
    ///
    /// The sink only receives bytes past the current high-water mark.
    pub fn add_sink(&mut self, sink: Box<dyn ByteSink>) -> usize {
        let sink: Box<dyn ByteSink> = if self.config.close_sinks {
            sink
        } else {
            Box::new(CloseShield::new(sink))
        };
        self.sinks.push(SinkSlot {
            sink,
            enabled: true,
        });
        self.sinks.len() - 1
    }

    /// Number of attached sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Enable or disable forwarding to the sink at `index`
    pub fn set_sink_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        let count = self.sinks.len();
        let slot = self
            .sinks
            .get_mut(index)
            .ok_or(ProtocolError::UnknownSink { index, count })?;
        slot.enabled = enabled;
        debug!(
            "Tee sink {index} {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Whether the sink at `index` receives bytes
    pub fn is_sink_enabled(&self, index: usize) -> Result<bool> {
        self.sinks
            .get(index)
            .map(|slot| slot.enabled)
            .ok_or_else(|| {
                ProtocolError::UnknownSink {
                    index,
                    count: self.sinks.len(),
                }
                .into()
            })
    }

    /// Position of the next byte the caller will read
    pub fn source_position(&self) -> u64 {
        self.source_position
    }

    /// Number of bytes the sinks have been offered
    pub fn destination_position(&self) -> u64 {
        self.destination_position
    }

    /// Borrow the wrapped source
    pub fn get_ref(&self) -> &S {
        &self.source
    }

    fn forward(&mut self, data: &[u8]) -> Result<()> {
        let mut first_failure = None;
        for (index, slot) in self.sinks.iter_mut().enumerate() {
            if !slot.enabled {
                continue;
            }
            if let Err(e) = slot.sink.write_all(data) {
                warn!("Tee sink {index} failed: {e}");
                first_failure.get_or_insert(Error::sink(index, e));
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    /// Read from the source and forward the unseen bytes
    ///
    /// Source failures are returned as the outer error; a sink failure comes
    /// back next to the byte count because the cursors have already moved.
    fn pass_through(&mut self, buf: &mut [u8]) -> Result<(usize, Option<Error>)> {
        let n = self.source.read(buf)?;
        if n == 0 {
            return Ok((0, None));
        }

        let end = self.source_position + n as u64;
        let failure = if end > self.destination_position {
            let already_seen =
                self.destination_position.saturating_sub(self.source_position) as usize;
            trace!("Tee forwarding {} bytes", n - already_seen);
            self.forward(&buf[already_seen..n]).err()
        } else {
            None
        };

        self.source_position = end;
        self.destination_position = self.destination_position.max(end);
        Ok((n, failure))
    }

    /// Forward the rest of the source; returns the drained byte count and the
    /// first sink failure
    ///
    /// Only a source failure stops the drain early.
    fn drain(&mut self) -> Result<(u64, Option<Error>)> {
        let mut scratch = vec![0u8; self.config.drain_chunk];
        let mut drained = 0u64;
        let mut first_failure = None;
        loop {
            let (n, failure) = self.pass_through(&mut scratch)?;
            if let Some(e) = failure {
                first_failure.get_or_insert(e);
            }
            if n == 0 {
                return Ok((drained, first_failure));
            }
            drained += n as u64;
        }
    }
}

impl<S: ByteSource> ByteSource for TeeDuplicator<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(ProtocolError::closed("tee").into());
        }
        let (n, failure) = self.pass_through(buf)?;
        failure.map_or(Ok(n), Err)
    }

    fn mark_supported(&self) -> bool {
        self.source.mark_supported()
    }

    fn mark(&mut self, limit: MarkLimit) -> Result<()> {
        self.source.mark(limit)?;
        self.mark_position = Some(self.source_position);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let mark = self.mark_position.ok_or(ProtocolError::ResetWithoutMark)?;
        self.source.reset()?;
        debug!(
            "Tee reset to {mark}; sinks stay at {}",
            self.destination_position
        );
        self.source_position = mark;
        Ok(())
    }

    /// Drain, then close the source and the sinks
    ///
    /// Every step is attempted; the first failure is returned.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_failure: Option<Error> = None;
        if self.config.drain_on_close {
            match self.drain() {
                Ok((drained, failure)) => {
                    if drained > 0 {
                        debug!("Tee drained {drained} unread bytes on close");
                    }
                    if let Some(e) = failure {
                        warn!("Tee drain failed: {e}");
                        first_failure.get_or_insert(e);
                    }
                }
                Err(e) => {
                    warn!("Tee drain failed: {e}");
                    first_failure.get_or_insert(e);
                }
            }
        }

        if let Err(e) = self.source.close() {
            first_failure.get_or_insert(e);
        }

        for (index, slot) in self.sinks.iter_mut().enumerate() {
            if let Err(e) = slot.sink.close() {
                warn!("Failed to close tee sink {index}: {e}");
                first_failure.get_or_insert(CleanupError::sink_close(index, e).into());
            }
        }

        first_failure.map_or(Ok(()), Err)
    }

    fn layer(&self) -> &'static str {
        "tee"
    }
}
