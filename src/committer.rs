//! Lockstep commits of the spectrogram and piano-roll streams

use ndarray::{s, Array2};

use crate::error::{CommitError, StoreResult};
use crate::store::FeatureStore;

/// Drives the spectrogram and piano-roll stores so that after every
/// successful [`commit`](Self::commit) both hold the same number of samples
/// and the last pair has equal widths.
///
/// Without a spectrogram store only the roll stream is written.
#[derive(Debug)]
pub struct DualStreamCommitter {
    spectrogram_store: Option<FeatureStore>,
    roll_store: FeatureStore,
    committed: usize,
}

impl DualStreamCommitter {
    pub fn new(spectrogram_store: Option<FeatureStore>, roll_store: FeatureStore) -> Self {
        Self { spectrogram_store, roll_store, committed: 0 }
    }

    /// Append one sample to both streams, right-padding the roll with zeros
    /// up to the spectrogram width. Every check runs before either store is
    /// touched, so a rejected sample leaves both stores as they were.
    pub fn commit(
        &mut self,
        spectrogram: Option<Array2<f32>>,
        roll: Array2<f32>,
        metadata: &str,
    ) -> Result<(), CommitError> {
        match (&mut self.spectrogram_store, spectrogram) {
            (None, None) => {
                self.roll_store.validate(roll.view())?;
                self.roll_store.append(roll.view(), metadata)?;
            }
            (Some(spectrogram_store), Some(spectrogram)) => {
                let (len_spectrogram, len_roll) = (spectrogram.ncols(), roll.ncols());
                if len_roll > len_spectrogram {
                    return Err(CommitError::LengthInvariantViolation {
                        spectrogram: len_spectrogram,
                        roll: len_roll,
                    });
                }
                let roll = pad_columns(roll, len_spectrogram);
                spectrogram_store.validate(spectrogram.view())?;
                self.roll_store.validate(roll.view())?;

                spectrogram_store.append(spectrogram.view(), metadata)?;
                self.roll_store.append(roll.view(), metadata)?;
            }
            (None, Some(_)) => {
                return Err(CommitError::StreamMismatch("spectrogram given but the stream is disabled"));
            }
            (Some(_), None) => {
                return Err(CommitError::StreamMismatch("spectrogram stream enabled but none given"));
            }
        }
        self.committed += 1;
        Ok(())
    }

    /// Close the spectrogram store (if any), then the roll store.
    pub fn finalize(&mut self) -> StoreResult<()> {
        if let Some(store) = self.spectrogram_store.as_mut() {
            store.close()?;
        }
        self.roll_store.close()
    }

    /// Number of samples committed to every enabled stream.
    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn spectrogram_store(&self) -> Option<&FeatureStore> {
        self.spectrogram_store.as_ref()
    }

    pub fn roll_store(&self) -> &FeatureStore {
        &self.roll_store
    }
}

/// Right-pad `matrix` with zero columns up to `width` columns.
pub fn pad_columns(matrix: Array2<f32>, width: usize) -> Array2<f32> {
    let (rows, columns) = matrix.dim();
    if columns >= width {
        return matrix;
    }
    let mut padded = Array2::<f32>::zeros((rows, width));
    padded.slice_mut(s![.., ..columns]).assign(&matrix);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{Compression, StoreReader};
    use tempfile::tempdir;

    fn committer(dir: &std::path::Path, with_mel: bool) -> DualStreamCommitter {
        let mel = with_mel.then(|| {
            FeatureStore::create(dir.join("mel.fstore"), 3, Compression::Zstd, 16, 16, true).unwrap()
        });
        let roll = FeatureStore::create(dir.join("roll.fstore"), 2, Compression::Zstd, 16, 16, true).unwrap();
        DualStreamCommitter::new(mel, roll)
    }

    #[test]
    fn test_pad_columns() {
        let m = Array2::<f32>::ones((2, 3));
        let padded = pad_columns(m, 5);
        assert_eq!(padded.dim(), (2, 5));
        assert!(padded.slice(s![.., 3..]).iter().all(|&v| v == 0.0));
        assert_eq!(pad_columns(Array2::ones((2, 5)), 3).ncols(), 5);
    }

    #[test]
    fn test_shorter_roll_is_padded() {
        let dir = tempdir().unwrap();
        let mut c = committer(dir.path(), true);
        c.commit(Some(Array2::ones((3, 100))), Array2::ones((2, 97)), "a").unwrap();
        c.finalize().unwrap();

        let roll = StoreReader::open(dir.path().join("roll.fstore")).unwrap();
        let sample = roll.sample(0).unwrap();
        assert_eq!(sample.ncols(), 100);
        assert!(sample.slice(s![.., ..97]).iter().all(|&v| v == 1.0));
        assert!(sample.slice(s![.., 97..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_longer_roll_mutates_nothing() {
        let dir = tempdir().unwrap();
        let mut c = committer(dir.path(), true);
        let err = c.commit(Some(Array2::ones((3, 90))), Array2::ones((2, 95)), "a").unwrap_err();
        assert!(matches!(err, CommitError::LengthInvariantViolation { spectrogram: 90, roll: 95 }));
        assert_eq!(c.committed(), 0);
        assert_eq!(c.roll_store().total_columns(), 0);
        assert_eq!(c.spectrogram_store().unwrap().total_columns(), 0);
    }

    #[test]
    fn test_bad_roll_height_leaves_spectrogram_alone() {
        let dir = tempdir().unwrap();
        let mut c = committer(dir.path(), true);
        let err = c.commit(Some(Array2::ones((3, 10))), Array2::ones((7, 10)), "a").unwrap_err();
        assert!(matches!(err, CommitError::Store(StoreError::ShapeMismatch { expected: 2, found: 7 })));
        assert!(c.spectrogram_store().unwrap().is_empty());
    }

    #[test]
    fn test_roll_only_stream() {
        let dir = tempdir().unwrap();
        let mut c = committer(dir.path(), false);
        c.commit(None, Array2::ones((2, 4)), "a").unwrap();
        assert!(matches!(
            c.commit(Some(Array2::ones((3, 4))), Array2::ones((2, 4)), "b"),
            Err(CommitError::StreamMismatch(_))
        ));
        c.finalize().unwrap();
        assert!(!dir.path().join("mel.fstore").exists());
        assert_eq!(StoreReader::open(dir.path().join("roll.fstore")).unwrap().len(), 1);
    }
}
