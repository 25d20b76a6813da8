//! Usage and invariant errors
//!
//! These never come from a failing resource: they report a caller that broke
//! the mark/reset, seek or result contract of a decorator.

use thiserror::Error;

/// Errors raised when a decorator's contract is violated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The source cannot replay
    #[error("mark/reset not supported by {layer}")]
    MarkNotSupported { layer: &'static str },

    /// `reset` without a preceding `mark`
    #[error("reset called but no mark is active")]
    ResetWithoutMark,

    /// The mark was discarded by a zero-length mark
    #[error("reset called after the mark was invalidated")]
    MarkInvalidated,

    /// More bytes than the mark limit were read since the mark
    #[error("reset failed: {consumed} bytes read past a mark limited to {limit} bytes")]
    MarkLimitExceeded { limit: u64, consumed: u64 },

    /// Backward seek to a position that was never cached
    #[error("cannot seek to {requested}: earliest cached position is {earliest}")]
    SeekBeforeCache { requested: u64, earliest: u64 },

    /// Store seek past the bytes written so far
    #[error("cannot seek to {requested}: only {written} bytes written")]
    SeekBeyondWritten { requested: u64, written: u64 },

    /// Producer result requested while the stream is still open
    #[error("producer result requested before the stream was closed")]
    ResultBeforeClose,

    /// Producer result already handed out
    #[error("producer result was already taken")]
    ResultAlreadyTaken,

    /// Operation on a closed stream
    #[error("{layer} stream is closed")]
    StreamClosed { layer: &'static str },

    /// Sink index out of range
    #[error("no sink at index {index} (have {count})")]
    UnknownSink { index: usize, count: usize },
}

impl ProtocolError {
    /// Create a mark-not-supported error for `layer`
    pub fn mark_not_supported(layer: &'static str) -> Self {
        Self::MarkNotSupported { layer }
    }

    /// Create a stream-closed error for `layer`
    pub fn closed(layer: &'static str) -> Self {
        Self::StreamClosed { layer }
    }
}
