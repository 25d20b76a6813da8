//! I/O related error types

use std::path::PathBuf;
use thiserror::Error;

/// I/O error with the layer that observed it
#[derive(Error, Debug)]
#[error("{}", format_io_error(self))]
pub struct IoError {
    /// The kind of I/O error
    pub kind: IoErrorKind,
    /// Decorator or resource that raised the error (if known)
    pub layer: Option<&'static str>,
    /// Path associated with the error (spill files)
    pub path: Option<PathBuf>,
    /// Underlying I/O error (if any)
    #[source]
    pub source: Option<std::io::Error>,
}

/// Kind of I/O error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorKind {
    /// The wrapped source failed
    Source,
    /// A sink failed
    Sink,
    /// Creating, writing or reading a spill file failed
    TempFile,
    /// The other end of a pipe is gone
    BrokenPipe,
    /// Generic I/O error
    Other,
}

impl IoError {
    /// Create an error for a failing source
    pub fn read_failed(layer: &'static str, source: std::io::Error) -> Self {
        Self {
            kind: IoErrorKind::Source,
            layer: Some(layer),
            path: None,
            source: Some(source),
        }
    }

    /// Create an error for a failing sink
    pub fn write_failed(layer: &'static str, source: std::io::Error) -> Self {
        Self {
            kind: IoErrorKind::Sink,
            layer: Some(layer),
            path: None,
            source: Some(source),
        }
    }

    /// Create a spill file error
    pub fn temp_file(path: Option<&std::path::Path>, source: std::io::Error) -> Self {
        Self {
            kind: IoErrorKind::TempFile,
            layer: Some("store"),
            path: path.map(|p| p.to_path_buf()),
            source: Some(source),
        }
    }

    /// Create a broken pipe error
    pub fn broken_pipe(layer: &'static str) -> Self {
        Self {
            kind: IoErrorKind::BrokenPipe,
            layer: Some(layer),
            path: None,
            source: None,
        }
    }

    /// Create an I/O error from a standard I/O error
    pub fn from_std(source: std::io::Error) -> Self {
        let kind = match source.kind() {
            std::io::ErrorKind::BrokenPipe => IoErrorKind::BrokenPipe,
            _ => IoErrorKind::Other,
        };

        Self {
            kind,
            layer: None,
            path: None,
            source: Some(source),
        }
    }

    /// Attach the layer that observed the error
    pub fn with_layer(mut self, layer: &'static str) -> Self {
        self.layer = Some(layer);
        self
    }
}

fn format_io_error(error: &IoError) -> String {
    let what = match error.kind {
        IoErrorKind::Source => "Source read failed",
        IoErrorKind::Sink => "Sink write failed",
        IoErrorKind::TempFile => "Spill file error",
        IoErrorKind::BrokenPipe => "Broken pipe",
        IoErrorKind::Other => "I/O error",
    };

    let mut message = match error.layer {
        Some(layer) => format!("{what} in {layer}"),
        None => what.to_string(),
    };
    if let Some(path) = &error.path {
        message.push_str(&format!(" ({})", path.display()));
    }
    if let Some(source) = &error.source {
        message.push_str(&format!(": {source}"));
    }
    message
}
