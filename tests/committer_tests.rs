//! Two-stream alignment tests against real store files

use ndarray::{s, Array2};
use piano_feature_store::error::CommitError;
use piano_feature_store::store::{Compression, FeatureStore, StoreReader};
use piano_feature_store::DualStreamCommitter;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const MEL_HEIGHT: usize = 8;
const ROLL_HEIGHT: usize = 5;

fn committer(dir: &Path) -> (DualStreamCommitter, PathBuf, PathBuf) {
    let mel_path = dir.join("mel.fstore");
    let roll_path = dir.join("roll.fstore");
    let mel = FeatureStore::create(&mel_path, MEL_HEIGHT, Compression::Zstd, 16, 16, true).unwrap();
    let roll = FeatureStore::create(&roll_path, ROLL_HEIGHT, Compression::Zstd, 16, 16, true).unwrap();
    (DualStreamCommitter::new(Some(mel), roll), mel_path, roll_path)
}

fn filled(height: usize, width: usize, value: f32) -> Array2<f32> {
    Array2::from_elem((height, width), value)
}

#[test]
fn test_short_roll_is_zero_padded() {
    let dir = tempdir().unwrap();
    let (mut committer, mel_path, roll_path) = committer(dir.path());

    committer
        .commit(Some(filled(MEL_HEIGHT, 100, -3.0)), filled(ROLL_HEIGHT, 97, 1.0), "padded")
        .unwrap();
    committer.finalize().unwrap();

    let mel = StoreReader::open(&mel_path).unwrap();
    let roll = StoreReader::open(&roll_path).unwrap();
    assert_eq!(mel.total_width(), 100);
    assert_eq!(roll.total_width(), 100);

    let sample = roll.sample(0).unwrap();
    assert!(sample.slice(s![.., ..97]).iter().all(|&v| v == 1.0));
    assert!(sample.slice(s![.., 97..]).iter().all(|&v| v == 0.0));
}

#[test]
fn test_long_roll_mutates_neither_store() {
    let dir = tempdir().unwrap();
    let (mut committer, mel_path, roll_path) = committer(dir.path());

    committer.commit(Some(filled(MEL_HEIGHT, 20, 0.5)), filled(ROLL_HEIGHT, 20, 1.0), "first").unwrap();
    let err = committer
        .commit(Some(filled(MEL_HEIGHT, 90, 0.5)), filled(ROLL_HEIGHT, 95, 1.0), "rejected")
        .unwrap_err();
    assert!(matches!(err, CommitError::LengthInvariantViolation { spectrogram: 90, roll: 95 }));
    assert_eq!(committer.committed(), 1);
    assert_eq!(committer.roll_store().total_columns(), 20);
    assert_eq!(committer.spectrogram_store().map(|s| s.total_columns()), Some(20));

    committer.commit(Some(filled(MEL_HEIGHT, 30, 0.5)), filled(ROLL_HEIGHT, 25, 1.0), "third").unwrap();
    committer.finalize().unwrap();

    for path in [&mel_path, &roll_path] {
        let reader = StoreReader::open(path).unwrap();
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.boundaries(), vec![0, 20]);
        assert_eq!(reader.metadata(0), Some("first"));
        assert_eq!(reader.metadata(1), Some("third"));
    }
}

#[test]
fn test_aligned_widths_across_many_commits() {
    let dir = tempdir().unwrap();
    let (mut committer, mel_path, roll_path) = committer(dir.path());

    for (i, (mel_w, roll_w)) in [(10, 10), (33, 31), (7, 1), (50, 49)].into_iter().enumerate() {
        committer
            .commit(Some(filled(MEL_HEIGHT, mel_w, 0.0)), filled(ROLL_HEIGHT, roll_w, 1.0), &i.to_string())
            .unwrap();
    }
    committer.finalize().unwrap();

    let mel = StoreReader::open(&mel_path).unwrap();
    let roll = StoreReader::open(&roll_path).unwrap();
    assert_eq!(mel.boundaries(), roll.boundaries());
    for i in 0..mel.len() {
        assert_eq!(mel.sample(i).unwrap().ncols(), roll.sample(i).unwrap().ncols());
        assert_eq!(mel.metadata(i), roll.metadata(i));
    }
}

#[test]
fn test_finalize_twice_fails() {
    let dir = tempdir().unwrap();
    let (mut committer, _, _) = committer(dir.path());
    committer.finalize().unwrap();
    assert!(committer.finalize().is_err());
}
