//! Error types for feature extraction and the chunked feature store

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the on-disk store and its in-memory buffer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("output already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("shape mismatch: store holds {expected} rows, matrix has {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("refusing to append a sample with zero columns")]
    EmptySample,
    #[error("store used after close")]
    UseAfterClose,
    #[error("invalid store parameter: {0}")]
    InvalidParameter(String),
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while committing one sample to both streams.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("piano roll has {roll} frames but spectrogram only {spectrogram}")]
    LengthInvariantViolation { spectrogram: usize, roll: usize },
    #[error("stream mismatch: {0}")]
    StreamMismatch(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of the external audio and MIDI feature extractors.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("MIDI error: {0}")]
    Midi(#[from] midly::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("resampler setup failed: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),
    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
    #[error("invalid audio: {0}")]
    InvalidAudio(String),
    #[error("invalid MIDI: {0}")]
    InvalidMidi(String),
}

/// Everything that can go wrong with a single dataset entry.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("missing source file: {0}")]
    MissingSourceFile(PathBuf),
    #[error("feature extraction failed for {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: ExtractionError,
    },
    #[error(transparent)]
    Commit(#[from] CommitError),
}

impl SampleError {
    /// Per-sample conditions leave the stores untouched and only skip the entry.
    pub fn is_skippable(&self) -> bool {
        match self {
            SampleError::MissingSourceFile(_) | SampleError::Extraction { .. } => true,
            SampleError::Commit(CommitError::LengthInvariantViolation { .. }) => true,
            SampleError::Commit(CommitError::Store(StoreError::EmptySample)) => true,
            SampleError::Commit(_) => false,
        }
    }
}

/// Fatal errors that terminate a preprocessing run.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error("dataset index error: {0}")]
    Dataset(#[from] csv::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PrepResult<T> = Result<T, PrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skippable_classification() {
        assert!(SampleError::MissingSourceFile(PathBuf::from("a.mid")).is_skippable());
        assert!(SampleError::Commit(CommitError::LengthInvariantViolation {
            spectrogram: 90,
            roll: 95
        })
        .is_skippable());
        assert!(SampleError::Commit(CommitError::Store(StoreError::EmptySample)).is_skippable());
        assert!(!SampleError::Commit(CommitError::Store(StoreError::UseAfterClose)).is_skippable());
        assert!(!SampleError::Commit(CommitError::Store(StoreError::ShapeMismatch {
            expected: 4,
            found: 3
        }))
        .is_skippable());
    }
}
