//! Heap-only store

use crate::Result;
use crate::error::ProtocolError;
use super::Store;

/// Store that keeps every byte in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Vec<u8>,
    read_position: u64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put(&mut self, data: &[u8]) -> Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn get(&mut self, buf: &mut [u8]) -> Result<usize> {
        let start = self.read_position as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
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
        self.data.len() as u64
    }

    fn release(&mut self) -> Result<()> {
        self.data = Vec::new();
        self.read_position = 0;
        Ok(())
    }
}
