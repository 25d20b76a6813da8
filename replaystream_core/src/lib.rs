//! replaystream core library
//!
//! Composable decorators over byte streams: replay buffering with disk
//! spillover, a producer/consumer pipe bridge, tee duplication, marker-based
//! extraction and throughput probes. Every decorator is a [`ByteSource`], so
//! they stack in any order.

pub mod close;
pub mod error;
pub mod marker;
pub mod pipe;
pub mod replay;
pub mod source;
pub mod stats;
pub mod store;
pub mod tee;

// Re-export main types
pub use close::{CloseOnce, CloseShield};
pub use error::{Error, Result};
pub use marker::{MarkerConfig, MarkerExtractor, extract};
pub use pipe::{ExecutionStrategy, PipeBridge, PipeConfig, PipeWriter, StrategyKind};
pub use replay::{ReplayBuffer, ReplayConfig};
pub use source::{
    ByteSink, ByteSource, DEFAULT_CHUNK_SIZE, MarkLimit, ReaderSource, SharedSink, SourceReader,
    WriterSink, pump,
};
pub use stats::{CallSite, StatsProbe, StatsRegistry, StatsSnapshot};
pub use store::{MemoryStore, Store, StoreConfig, ThresholdStore};
pub use tee::{TeeConfig, TeeDuplicator};

/// Configuration for every decorator
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub replay: ReplayConfig,
    pub pipe: PipeConfig,
    pub tee: TeeConfig,
    pub marker: MarkerConfig,
}

impl StreamConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.replay.validate()?;
        self.pipe.validate()?;
        self.tee.validate()?;
        self.marker.validate()?;
        Ok(())
    }
}
