//! Resource release errors

use super::Error as StreamError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while releasing resources
///
/// Cleanup keeps going after one of these; the first one is reported.
#[derive(Error, Debug)]
pub enum CleanupError {
    /// The spill file could not be deleted
    #[error("Failed to delete spill file {}: {source}", .path.display())]
    TempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sink failed to close
    #[error("Failed to close sink {index}: {source}")]
    SinkClose {
        index: usize,
        #[source]
        source: Box<StreamError>,
    },
}

impl CleanupError {
    /// Create a spill file deletion error
    pub fn temp_file(path: PathBuf, source: std::io::Error) -> Self {
        Self::TempFile { path, source }
    }

    /// Create a sink close error
    pub fn sink_close(index: usize, source: StreamError) -> Self {
        Self::SinkClose {
            index,
            source: Box::new(source),
        }
    }
}
