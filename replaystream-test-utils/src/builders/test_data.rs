//! Test data builders for creating test scenarios

use std::path::{Path, PathBuf};

/// Builder for deterministic byte payloads
#[derive(Debug, Clone, Default)]
pub struct TestDataBuilder {
    parts: Vec<Vec<u8>>,
}

impl TestDataBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `len` bytes counting up from zero, wrapping at 256
    pub fn sequential(mut self, len: usize) -> Self {
        self.parts.push((0..len).map(|i| (i % 256) as u8).collect());
        self
    }

    /// Append `len` pseudo-random bytes derived from `seed`
    pub fn seeded(mut self, len: usize, seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        let mut content = Vec::with_capacity(len);
        for _ in 0..len {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            content.push((state >> 56) as u8);
        }
        self.parts.push(content);
        self
    }

    /// Append literal bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.parts.push(data.to_vec());
        self
    }

    /// Append `payload` wrapped in `start` and `stop` markers
    pub fn region(self, start: &[u8], payload: &[u8], stop: &[u8]) -> Self {
        self.bytes(start).bytes(payload).bytes(stop)
    }

    /// Concatenate everything appended so far
    pub fn build(self) -> Vec<u8> {
        self.parts.concat()
    }
}

/// Writes test files into a directory and removes them on drop
pub struct TestFileBuilder {
    base_dir: PathBuf,
    generated_files: Vec<PathBuf>,
}

impl TestFileBuilder {
    /// Create a new test file builder
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            generated_files: Vec::new(),
        }
    }

    /// Write `content` to `name` under the base directory
    pub fn write(&mut self, name: &str, content: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.base_dir.join(name);
        std::fs::write(&path, content)?;
        self.generated_files.push(path.clone());
        Ok(path)
    }

    /// Number of files currently in the base directory
    pub fn files_in_dir(&self) -> usize {
        std::fs::read_dir(&self.base_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Remove every generated file
    pub fn cleanup(&mut self) {
        for path in self.generated_files.drain(..) {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for TestFileBuilder {
    fn drop(&mut self) {
        self.cleanup();
    }
}
