//! Builders for test data and files

mod test_data;

pub use test_data::{TestDataBuilder, TestFileBuilder};
