//! Store that migrates to a temporary file past a byte threshold
//!
//! Layout: bytes `[0, spill_position)` live in the spill file, bytes
//! `[spill_position, write_position)` in memory. The memory region never holds
//! more than `threshold` bytes; when an append would push it past that, the
//! region is flushed to the file first.

use crate::Result;
use crate::error::{CleanupError, IoError, ProtocolError};
use log::{debug, trace, warn};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use super::Store;
use tempfile::NamedTempFile;

/// Memory store with lazy disk spillover
#[derive(Debug)]
pub struct ThresholdStore {
    threshold: usize,
    spill_dir: Option<PathBuf>,
    file: Option<NamedTempFile>,
    spill_position: u64,
    memory: Vec<u8>,
    read_position: u64,
    files_created: u64,
}

impl ThresholdStore {
    /// Create a store that spills once more than `threshold` bytes are held
    pub fn new(threshold: usize, spill_dir: Option<PathBuf>) -> Self {
        Self {
            threshold,
            spill_dir,
            file: None,
            spill_position: 0,
            memory: Vec::new(),
            read_position: 0,
            files_created: 0,
        }
    }

    /// Configured threshold
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Bytes currently held on disk
    pub fn spill_position(&self) -> u64 {
        self.spill_position
    }

    /// Bytes currently held in memory
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Number of spill files created over the store's lifetime
    pub fn files_created(&self) -> u64 {
        self.files_created
    }

    fn ensure_file(&mut self) -> Result<&mut NamedTempFile> {
        if self.file.is_none() {
            let mut builder = tempfile::Builder::new();
            builder.prefix("replaystream-").suffix(".spill");
            let created = match &self.spill_dir {
                Some(dir) => builder.tempfile_in(dir),
                None => builder.tempfile(),
            };
            let file = created.map_err(|e| IoError::temp_file(self.spill_dir.as_deref(), e))?;
            debug!(
                "Spilling store to {} (threshold {} bytes)",
                file.path().display(),
                self.threshold
            );
            self.files_created += 1;
            self.file = Some(file);
        }
        // Populated just above.
        self.file
            .as_mut()
            .ok_or_else(|| ProtocolError::closed("store").into())
    }

    fn append_to_file(&mut self, data: &[u8]) -> Result<()> {
        let offset = self.spill_position;
        let file = self.ensure_file()?;
        let path = file.path().to_path_buf();
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(data))
            .map_err(|e| IoError::temp_file(Some(&path), e))?;
        self.spill_position += data.len() as u64;
        Ok(())
    }

    fn spill_memory(&mut self) -> Result<()> {
        if self.memory.is_empty() {
            return Ok(());
        }
        let memory = std::mem::take(&mut self.memory);
        self.append_to_file(&memory)?;
        trace!("Moved {} bytes from memory to disk", memory.len());
        // Keep the allocation for the next memory region.
        self.memory = memory;
        self.memory.clear();
        Ok(())
    }

    fn get_from_file(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = (self.spill_position - self.read_position) as usize;
        let want = buf.len().min(available);
        let offset = self.read_position;
        let Some(file) = self.file.as_mut() else {
            return Err(ProtocolError::closed("store").into());
        };
        let path = file.path().to_path_buf();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| IoError::temp_file(Some(&path), e))?;

        let mut filled = 0;
        while filled < want {
            let n = file
                .read(&mut buf[filled..want])
                .map_err(|e| IoError::temp_file(Some(&path), e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

impl Store for ThresholdStore {
    fn put(&mut self, data: &[u8]) -> Result<()> {
        if self.memory.len() + data.len() > self.threshold {
            self.spill_memory()?;
            if data.len() > self.threshold {
                return self.append_to_file(data);
            }
        }
        self.memory.extend_from_slice(data);
        Ok(())
    }

    fn get(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.read_position >= self.write_position() {
            return Ok(0);
        }

        let n = if self.read_position < self.spill_position {
            self.get_from_file(buf)?
        } else {
            let start = (self.read_position - self.spill_position) as usize;
            let n = buf.len().min(self.memory.len() - start);
            buf[..n].copy_from_slice(&self.memory[start..start + n]);
            n
        };
        self.read_position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.write_position() {
            return Err(ProtocolError::SeekBeyondWritten {
                requested: position,
                written: self.write_position(),
            }
            .into());
        }
        self.read_position = position;
        Ok(())
    }

    fn read_position(&self) -> u64 {
        self.read_position
    }

    fn write_position(&self) -> u64 {
        self.spill_position + self.memory.len() as u64
    }

    fn release(&mut self) -> Result<()> {
        self.memory = Vec::new();
        self.spill_position = 0;
        self.read_position = 0;

        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let path = file.path().to_path_buf();
        match file.close() {
            Ok(()) => {
                debug!("Deleted spill file {}", path.display());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete spill file {}: {e}", path.display());
                Err(CleanupError::temp_file(path, e).into())
            }
        }
    }

    fn is_spilled(&self) -> bool {
        self.file.is_some()
    }

    fn spill_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path())
    }
}
