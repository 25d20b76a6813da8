//! Mock implementations for testing

mod sink;
mod source;

pub use sink::MockSink;
pub use source::{MockSource, SourceProbe};
