//! Dataset retrieval and preparation
//!
//! Downloading, `.mat` parsing, layout transforms and burn dataset adapters.

pub mod dataset;
pub mod fetch;
pub mod preprocess;

pub use dataset::{DatasetSplit, ImageBatch, ImageBatcher, ImageItem, SvhnDataset};
pub use fetch::{DataFetcher, HttpTransport, Transport};
pub use preprocess::{load, reshape, to_grayscale, Images, Layout, NUM_CLASSES};
