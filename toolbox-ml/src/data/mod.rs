//! Datasets: recursive splitting, shuffling, loading and batching.

pub mod dataset;
pub mod loader;
pub mod source;
pub mod split;

pub use dataset::{Dataset, Node, SplitOptions};
pub use loader::{BatchSource, DataLoader};
pub use source::{CsvOptions, CsvRecord, Extensions, collect_files};
pub use split::{REST_SUBSET, Split, SplitSize};
