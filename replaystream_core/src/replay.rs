//! Replay buffer: mark/reset over a forward-only source
//!
//! Bytes pulled from the wrapped source while a mark is active are appended
//! to a [`Store`]; after `reset` they are served from the store until the
//! logical cursor catches up with the source again. The wrapped source is
//! never asked for the same byte range twice.

use crate::Result;
use crate::close::CloseOnce;
use crate::error::{ProtocolError, ValidationError};
use crate::source::{ByteSource, DEFAULT_CHUNK_SIZE, MarkLimit};
use crate::store::{DEFAULT_SPILL_THRESHOLD, Store, StoreConfig};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Replay buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Bytes kept in memory before spilling; `None` keeps everything in memory
    pub threshold: Option<usize>,
    /// Directory for spill files
    pub spill_dir: Option<PathBuf>,
    /// Cache the whole stream so any earlier position can be sought back to
    pub retain_history: bool,
    /// Chunk size used when skipping forward
    pub read_chunk: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            threshold: Some(DEFAULT_SPILL_THRESHOLD),
            spill_dir: None,
            retain_history: false,
            read_chunk: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ReplayConfig {
    /// Store settings derived from this configuration
    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            threshold: self.threshold,
            spill_dir: self.spill_dir.clone(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.read_chunk == 0 {
            return Err(ValidationError::invalid_parameter(
                "read_chunk",
                "must be greater than zero",
            )
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkState {
    None,
    Active { position: u64, limit: MarkLimit },
    Invalidated,
    Exceeded { limit: u64, consumed: u64 },
}

/// Gives any forward-only [`ByteSource`] unlimited mark/reset
pub struct ReplayBuffer<S> {
    source: CloseOnce<S>,
    store: Box<dyn Store>,
    /// Absolute stream position of store offset 0
    base: u64,
    position: u64,
    source_position: u64,
    mark: MarkState,
    retain_history: bool,
    read_chunk: usize,
    closed: bool,
}

impl<S: ByteSource> ReplayBuffer<S> {
    /// Wrap `source` using `config`
    pub fn new(source: S, config: &ReplayConfig) -> Result<Self> {
        config.validate()?;
        let mut buffer = Self::with_store(source, config.store().build());
        buffer.retain_history = config.retain_history;
        buffer.read_chunk = config.read_chunk;
        Ok(buffer)
    }

    /// Wrap `source` with an explicit store
    pub fn with_store(source: S, store: Box<dyn Store>) -> Self {
        Self {
            source: CloseOnce::new(source),
            store,
            base: 0,
            position: 0,
            source_position: 0,
            mark: MarkState::None,
            retain_history: false,
            read_chunk: DEFAULT_CHUNK_SIZE,
            closed: false,
        }
    }

    /// Logical read position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of bytes pulled from the wrapped source
    pub fn source_position(&self) -> u64 {
        self.source_position
    }

    /// Number of bytes currently held for replay
    pub fn buffered(&self) -> u64 {
        self.store.write_position()
    }

    /// Whether held bytes currently live on disk
    pub fn is_spilled(&self) -> bool {
        self.store.is_spilled()
    }

    /// Path of the spill file, if one exists
    pub fn spill_path(&self) -> Option<&Path> {
        self.store.spill_path()
    }

    /// Whether a reset would currently succeed
    pub fn can_reset(&self) -> bool {
        matches!(self.mark, MarkState::Active { .. })
    }

    /// Move the logical cursor to `target`
    ///
    /// Forward moves read (and cache, if marked) the skipped bytes, stopping
    /// early at end-of-data. Backward moves only succeed inside the cached
    /// range. Returns the position reached.
    pub fn seek(&mut self, target: u64) -> Result<u64> {
        self.ensure_open()?;

        if target >= self.position {
            let mut scratch = vec![0u8; self.read_chunk.min((target - self.position) as usize)];
            while self.position < target {
                let want = scratch.len().min((target - self.position) as usize);
                if self.read(&mut scratch[..want])? == 0 {
                    break;
                }
            }
            return Ok(self.position);
        }

        if target < self.base {
            return Err(ProtocolError::SeekBeforeCache {
                requested: target,
                earliest: self.base,
            }
            .into());
        }
        self.position = target;
        self.store.seek(target - self.base)?;
        trace!("Replay buffer relocated to {target}");
        Ok(target)
    }

    /// Borrow the wrapped source
    pub fn get_ref(&self) -> &S {
        self.source.get_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ProtocolError::closed("replay").into());
        }
        Ok(())
    }

    fn caching(&self) -> bool {
        self.retain_history || matches!(self.mark, MarkState::Active { .. })
    }

    fn enforce_limit(&mut self) {
        if let MarkState::Active {
            position,
            limit: MarkLimit::Bytes(limit),
        } = self.mark
        {
            let consumed = self.position.saturating_sub(position);
            if consumed > limit {
                debug!("Mark at {position} exceeded its {limit} byte limit");
                self.mark = MarkState::Exceeded { limit, consumed };
            }
        }
    }

    /// Drop cached bytes once nothing can replay them
    fn discard_unreachable(&mut self) -> Result<()> {
        if self.caching() || self.position < self.source_position {
            return Ok(());
        }
        if self.store.write_position() > 0 || self.base != self.source_position {
            self.store.release()?;
            self.base = self.source_position;
        }
        Ok(())
    }

    fn read_from_store(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = (self.source_position - self.position) as usize;
        let want = buf.len().min(available);
        self.store.seek(self.position - self.base)?;
        let n = self.store.get(&mut buf[..want])?;
        debug_assert!(n > 0, "store lost bytes below the source position");
        self.position += n as u64;
        Ok(n)
    }

    fn read_from_source(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.source.read(buf)?;
        if n > 0 {
            if self.caching() {
                self.store.put(&buf[..n])?;
            }
            self.source_position += n as u64;
            self.position += n as u64;
        }
        Ok(n)
    }
}

impl<S: ByteSource> ByteSource for ReplayBuffer<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let n = if self.position < self.source_position {
            self.read_from_store(buf)?
        } else {
            self.read_from_source(buf)?
        };

        self.enforce_limit();
        if let Err(e) = self.discard_unreachable() {
            // Bytes already read are returned even if the cache cannot be dropped.
            warn!("Failed to discard replay cache: {e}");
        }
        Ok(n)
    }

    fn mark_supported(&self) -> bool {
        true
    }

    fn mark(&mut self, limit: MarkLimit) -> Result<()> {
        self.ensure_open()?;

        match limit {
            MarkLimit::Invalidate | MarkLimit::Bytes(0) => {
                debug!("Mark invalidated at {}", self.position);
                self.mark = MarkState::Invalidated;
                self.discard_unreachable()
            }
            MarkLimit::Unlimited | MarkLimit::Bytes(_) => {
                if !self.retain_history && self.position == self.source_position {
                    // Nothing before this point can be replayed any more.
                    self.mark = MarkState::None;
                    self.discard_unreachable()?;
                }
                debug!("Mark set at {} ({limit:?})", self.position);
                self.mark = MarkState::Active {
                    position: self.position,
                    limit,
                };
                Ok(())
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;

        match self.mark {
            MarkState::None => Err(ProtocolError::ResetWithoutMark.into()),
            MarkState::Invalidated => Err(ProtocolError::MarkInvalidated.into()),
            MarkState::Exceeded { limit, consumed } => {
                Err(ProtocolError::MarkLimitExceeded { limit, consumed }.into())
            }
            MarkState::Active { position, .. } => {
                if position < self.source_position {
                    self.store.seek(position - self.base)?;
                }
                debug!("Reset from {} to {position}", self.position);
                self.position = position;
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.mark = MarkState::None;

        let source_result = self.source.close();
        let store_result = self.store.release();
        match (source_result, store_result) {
            (Err(source_err), Err(store_err)) => {
                warn!("Replay cache cleanup failed after source close error: {store_err}");
                Err(source_err)
            }
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    fn layer(&self) -> &'static str {
        "replay"
    }
}
