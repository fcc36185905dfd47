//! Preprocessing of paired piano recordings and MIDI files into chunked,
//! append-only feature stores: log-mel spectrograms on one side and
//! frame-aligned piano rolls on the other.

pub mod committer;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod midi;
pub mod pipeline;
pub mod preprocessing;
pub mod store;

pub use committer::DualStreamCommitter;
pub use config::{load_config, validate_config, Config};
pub use dataset::{DatasetEntry, PuDoMS};
pub use error::{CommitError, ExtractionError, PrepError, SampleError, StoreError};
pub use midi::PianoRollExtractor;
pub use pipeline::{process_dataset, run, RollExtractor, RunSummary, SpectrogramExtractor};
pub use preprocessing::LogMelExtractor;
pub use store::{Compression, FeatureStore, StoreReader};
