//! Dataset-to-store orchestration

use std::path::Path;

use ndarray::Array2;

use crate::committer::DualStreamCommitter;
use crate::config::{validate_config, Config};
use crate::constants::PROGRESS_EVERY;
use crate::dataset::{DatasetEntry, PuDoMS};
use crate::error::{ExtractionError, PrepResult, SampleError, StoreError};
use crate::midi::PianoRollExtractor;
use crate::preprocessing::LogMelExtractor;
use crate::store::FeatureStore;

/// Audio file to `(feature_height, frames)` spectrogram.
pub trait SpectrogramExtractor {
    fn feature_height(&self) -> usize;
    fn extract(&self, audio_path: &Path) -> Result<Array2<f32>, ExtractionError>;
}

/// MIDI file to stacked `(roll_height, frames)` piano roll.
pub trait RollExtractor {
    fn extract(&self, midi_path: &Path) -> Result<Array2<f32>, ExtractionError>;
}

impl SpectrogramExtractor for LogMelExtractor {
    fn feature_height(&self) -> usize {
        self.mel_bins()
    }

    fn extract(&self, audio_path: &Path) -> Result<Array2<f32>, ExtractionError> {
        self.extract_file(audio_path)
    }
}

impl RollExtractor for PianoRollExtractor {
    fn extract(&self, midi_path: &Path) -> Result<Array2<f32>, ExtractionError> {
        self.extract_file(midi_path)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub committed: usize,
    pub skipped: usize,
}

/// Extract and commit one entry. Any error leaves both stores untouched
/// unless it comes from the stores themselves.
pub fn process_entry(
    dataset: &PuDoMS,
    entry: &DatasetEntry,
    spectrogram_extractor: Option<&dyn SpectrogramExtractor>,
    roll_extractor: &dyn RollExtractor,
    committer: &mut DualStreamCommitter,
) -> Result<(), SampleError> {
    let midi_path = dataset
        .midi_path(entry)
        .ok_or_else(|| SampleError::MissingSourceFile(dataset.root().join(entry.basename())))?;
    let audio_path = dataset.audio_path(entry);

    let spectrogram = match spectrogram_extractor {
        Some(extractor) => {
            if !audio_path.is_file() {
                return Err(SampleError::MissingSourceFile(audio_path));
            }
            let spectrogram = extractor
                .extract(&audio_path)
                .map_err(|source| SampleError::Extraction { path: audio_path.clone(), source })?;
            Some(spectrogram)
        }
        None => None,
    };

    log::debug!("Processing MIDI file: {}", midi_path.display());
    let roll = roll_extractor
        .extract(&midi_path)
        .map_err(|source| SampleError::Extraction { path: midi_path.clone(), source })?;

    committer.commit(spectrogram, roll, &entry.metadata_string())?;
    Ok(())
}

/// Run every dataset entry through the extractors in order, skipping the
/// ones that fail per sample, then close the stores.
pub fn process_dataset(
    dataset: &PuDoMS,
    spectrogram_extractor: Option<&dyn SpectrogramExtractor>,
    roll_extractor: &dyn RollExtractor,
    mut committer: DualStreamCommitter,
) -> PrepResult<RunSummary> {
    if let (Some(extractor), Some(store)) = (spectrogram_extractor, committer.spectrogram_store()) {
        if extractor.feature_height() != store.feature_height() {
            return Err(StoreError::ShapeMismatch {
                expected: store.feature_height(),
                found: extractor.feature_height(),
            }
            .into());
        }
    }

    let mut summary = RunSummary::default();
    let total = dataset.len();

    for (i, entry) in dataset.entries().iter().enumerate() {
        match process_entry(dataset, entry, spectrogram_extractor, roll_extractor, &mut committer) {
            Ok(()) => summary.committed += 1,
            Err(err) if err.is_skippable() => {
                log::warn!("Skipping {}: {}", entry.relative_path, err);
                summary.skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
        if (i + 1) % PROGRESS_EVERY == 0 {
            log::info!("[{}/{}] {}", i + 1, total, dataset.root().join(&entry.relative_path).display());
        }
    }

    committer.finalize()?;
    log::info!("Done! {} samples committed, {} skipped", summary.committed, summary.skipped);
    Ok(summary)
}

/// Full preprocessing run: index the dataset, create both stores and fill them.
pub fn run(config: &Config) -> PrepResult<RunSummary> {
    validate_config(config)?;
    let dataset = PuDoMS::open(&config.input_path, &config.splits)?;

    std::fs::create_dir_all(&config.output_dir)?;
    let mel_path = (!config.ignore_mel).then(|| config.mel_store_path());
    let roll_path = config.roll_store_path();
    for path in mel_path.iter().chain(std::iter::once(&roll_path)) {
        if path.exists() {
            return Err(StoreError::AlreadyExists(path.clone()).into());
        }
    }

    let chunk = config.data_chunk_length();
    let spectrogram_extractor = match &mel_path {
        Some(path) => {
            log::info!("Logmels stored into {}", path.display());
            Some(LogMelExtractor::new(
                config.target_sr,
                config.stft_winsize,
                config.stft_hopsize,
                config.melbins,
                config.mel_fmin as f32,
                config.mel_fmax as f32,
            ))
        }
        None => None,
    };
    let mel_store = match &mel_path {
        Some(path) => Some(FeatureStore::create(path, config.melbins, config.compression, chunk, chunk, true)?),
        None => None,
    };
    log::info!("Piano rolls stored into {}", roll_path.display());
    let roll_store =
        FeatureStore::create(&roll_path, config.roll_height(), config.compression, chunk, chunk, true)?;

    let roll_extractor = PianoRollExtractor::new(config.quant_secs(), config.midi_sus_extend, true);
    let committer = DualStreamCommitter::new(mel_store, roll_store);

    log::info!("Computing features for {} entries...", dataset.len());
    process_dataset(
        &dataset,
        spectrogram_extractor.as_ref().map(|e| e as &dyn SpectrogramExtractor),
        &roll_extractor,
        committer,
    )
}
