//! Test utilities for replaystream
//!
//! This crate provides mock sources and sinks with observable counters plus
//! builders for deterministic test data.

pub mod builders;
pub mod mocks;

// Re-export commonly used types
pub use builders::{TestDataBuilder, TestFileBuilder};
pub use mocks::{MockSink, MockSource, SourceProbe};
