//! Failures captured from pipe producer tasks

use super::Error as StreamError;
use std::sync::Arc;
use thiserror::Error;

/// A producer failure, captured once and re-raised to every observer
///
/// The consumer sees it from the read that hits end-of-data and again from
/// `PipeBridge::result`, so the underlying error is shared.
#[derive(Error, Debug, Clone)]
pub enum ProducerError {
    /// The producer returned an error
    #[error("Producer task failed: {source}")]
    Failed {
        #[source]
        source: Arc<StreamError>,
    },

    /// The producer ended without reporting an outcome (panic or lost task)
    #[error("Producer task ended without producing a result")]
    Vanished,
}

impl ProducerError {
    /// Capture a producer's error
    pub fn failed(source: StreamError) -> Self {
        Self::Failed {
            source: Arc::new(source),
        }
    }

    /// The captured error, if the producer returned one
    pub fn cause(&self) -> Option<&StreamError> {
        match self {
            Self::Failed { source } => Some(source.as_ref()),
            Self::Vanished => None,
        }
    }
}
