//! Byte stores backing replay buffers
//!
//! A store is an append-only byte log with a movable read cursor. The replay
//! buffer appends every byte it pulls from its source while a mark is active
//! and reads them back after a reset.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod memory;
mod threshold;

pub use memory::MemoryStore;
pub use threshold::ThresholdStore;

/// Default spill threshold (8MB)
pub const DEFAULT_SPILL_THRESHOLD: usize = 8 * 1024 * 1024;

/// Append-only byte log with a random-access read cursor
pub trait Store: Send {
    /// Append `data` at the write cursor
    fn put(&mut self, data: &[u8]) -> Result<()>;

    /// Copy bytes from the read cursor into `buf`, advancing the cursor
    ///
    /// Returns 0 once the read cursor reaches the write cursor.
    fn get(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move the read cursor; it may not pass the write cursor
    fn seek(&mut self, position: u64) -> Result<()>;

    /// Current read cursor
    fn read_position(&self) -> u64;

    /// Number of bytes written since creation or the last release
    fn write_position(&self) -> u64;

    /// Drop every held byte and delete any backing file
    ///
    /// The store is left empty and may be written again.
    fn release(&mut self) -> Result<()>;

    /// Whether bytes currently live on disk
    fn is_spilled(&self) -> bool {
        false
    }

    /// Path of the backing file, if one exists
    fn spill_path(&self) -> Option<&Path> {
        None
    }
}

/// Store selection for a replay buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bytes kept in memory before spilling to disk; `None` never spills
    pub threshold: Option<usize>,
    /// Directory for spill files; the OS temp dir when unset
    pub spill_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            threshold: Some(DEFAULT_SPILL_THRESHOLD),
            spill_dir: None,
        }
    }
}

impl StoreConfig {
    /// In-memory only configuration
    pub fn memory() -> Self {
        Self {
            threshold: None,
            spill_dir: None,
        }
    }

    /// Spill past `threshold` bytes into the OS temp dir
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold: Some(threshold),
            spill_dir: None,
        }
    }

    /// Put spill files in `dir`
    pub fn spill_into(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Build the configured store
    pub fn build(&self) -> Box<dyn Store> {
        match self.threshold {
            Some(threshold) => Box::new(ThresholdStore::new(threshold, self.spill_dir.clone())),
            None => Box::new(MemoryStore::new()),
        }
    }
}
