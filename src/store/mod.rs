//! Append-only chunked storage for variable-width feature matrices.

pub mod chunked_file;
pub mod feature_store;
pub mod format;
pub mod reader;

pub use chunked_file::ChunkedArrayFile;
pub use feature_store::{BufferState, FeatureStore};
pub use format::{Compression, Dtype, MetadataEntry};
pub use reader::StoreReader;
