//! Error types for the replaystream core library
//!
//! Errors are grouped by the layer that raises them so callers can tell an
//! I/O failure of the wrapped source apart from a broken mark/reset contract,
//! a failed producer task or a cleanup problem.

use thiserror::Error;

pub mod cleanup;
pub mod io;
pub mod producer;
pub mod protocol;
pub mod validation;

pub use self::cleanup::CleanupError;
pub use self::io::{IoError, IoErrorKind};
pub use self::producer::ProducerError;
pub use self::protocol::ProtocolError;
pub use self::validation::ValidationError;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the replaystream core library
///
/// - I/O errors: failures of the wrapped source, a sink, or the spill file
/// - Protocol errors: mark/reset/seek/result misuse
/// - Producer errors: failures captured from a pipe producer task
/// - Sink errors: a tee sink rejected forwarded bytes
/// - Cleanup errors: resources that could not be released
/// - Validation errors: bad configuration
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error(transparent)]
    Io(#[from] IoError),

    /// Usage and invariant errors
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Failure captured from a producer task
    #[error(transparent)]
    Producer(#[from] ProducerError),

    /// A duplication sink failed
    #[error("Sink {index} failed: {source}")]
    Sink {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// Resource release failures
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// Configuration errors
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Wrap an error raised by the sink at `index`
    pub fn sink(index: usize, source: Error) -> Self {
        Self::Sink {
            index,
            source: Box::new(source),
        }
    }

    /// Whether this error came from a consumer that went away
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            Self::Io(err) => err.kind == IoErrorKind::BrokenPipe,
            Self::Sink { source, .. } => source.is_broken_pipe(),
            _ => false,
        }
    }

    /// Whether this error reports misuse rather than a failing resource
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

// Conversions from and to std::io::Error

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io(IoError::from_std(source))
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(IoError {
                source: Some(source),
                ..
            }) => source,
            Error::Io(io_err) if io_err.kind == IoErrorKind::BrokenPipe => {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, io_err)
            }
            Error::Protocol(protocol) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, protocol)
            }
            Error::Validation(validation) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, validation)
            }
            other => std::io::Error::other(other),
        }
    }
}
