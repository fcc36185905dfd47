//! Run configuration for the feature preprocessing pipeline

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    ALL_SPLITS, CHUNKLEN_SECONDS, DATASET_NAME, MEL_BINS, MEL_FMAX, MEL_FMIN, NUM_MIDI_VALUES,
    ROLL_HEIGHT, STFT_HOPSIZE, STFT_WINSIZE, STORE_EXT, TARGET_SAMPLE_RATE,
};
use crate::error::{PrepError, PrepResult};
use crate::store::Compression;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the dataset, holding the CSV index and the WAV/MIDI files
    pub input_path: PathBuf,
    /// Where the stores are written. Created if missing.
    pub output_dir: PathBuf,
    pub dataset_name: String,
    pub splits: Vec<String>,

    pub target_sr: u32,
    pub stft_winsize: usize,
    pub stft_hopsize: usize,
    pub melbins: usize,
    pub mel_fmin: u32,
    pub mel_fmax: u32,

    /// Extend released notes while the sustain pedal is down
    pub midi_sus_extend: bool,

    /// Target length of a persisted chunk. Should be a bit larger than the
    /// training chunk length.
    pub chunklen_seconds: f32,
    pub compression: Compression,
    /// Only compute the piano rolls
    pub ignore_mel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: Path::new("data").join(DATASET_NAME),
            output_dir: PathBuf::from("data"),
            dataset_name: DATASET_NAME.to_string(),
            splits: ALL_SPLITS.iter().map(|s| s.to_string()).collect(),
            target_sr: TARGET_SAMPLE_RATE,
            stft_winsize: STFT_WINSIZE,
            stft_hopsize: STFT_HOPSIZE,
            melbins: MEL_BINS,
            mel_fmin: MEL_FMIN,
            mel_fmax: MEL_FMAX,
            midi_sus_extend: true,
            chunklen_seconds: CHUNKLEN_SECONDS,
            compression: Compression::Zstd,
            ignore_mel: false,
        }
    }
}

impl Config {
    /// Seconds per spectrogram frame, also the piano-roll quantization step.
    pub fn quant_secs(&self) -> f64 {
        self.stft_hopsize as f64 / self.target_sr as f64
    }

    /// Columns per persisted chunk, used for both data and metadata.
    pub fn data_chunk_length(&self) -> usize {
        ((self.chunklen_seconds as f64 / self.quant_secs()).round() as usize).max(1)
    }

    pub fn roll_height(&self) -> usize {
        ROLL_HEIGHT
    }

    pub fn mel_store_path(&self) -> PathBuf {
        self.output_dir.join(mel_store_basename(
            &self.dataset_name,
            self.target_sr,
            self.stft_winsize,
            self.stft_hopsize,
            self.melbins,
            self.mel_fmin,
            self.mel_fmax,
        ))
    }

    pub fn roll_store_path(&self) -> PathBuf {
        self.output_dir.join(roll_store_basename(
            &self.dataset_name,
            self.quant_secs(),
            NUM_MIDI_VALUES,
            self.midi_sus_extend,
        ))
    }
}

/// Store filename carrying every log-mel parameter, so the file can be
/// traced back to how it was computed.
pub fn mel_store_basename(
    dataset_name: &str,
    sample_rate: u32,
    winsize: usize,
    hopsize: usize,
    melbins: usize,
    fmin: u32,
    fmax: u32,
) -> String {
    format!(
        "{dataset_name}_logmel_sr{sample_rate}_win{winsize}_hop{hopsize}_mel{melbins}_fmin{fmin}_fmax{fmax}.{STORE_EXT}"
    )
}

pub fn roll_store_basename(dataset_name: &str, quant_secs: f64, num_keys: usize, sus_extend: bool) -> String {
    let sus = if sus_extend { "sus" } else { "nosus" };
    format!("{dataset_name}_roll_quant{quant_secs:.6}_keys{num_keys}_{sus}.{STORE_EXT}")
}

/// Check parameter consistency
pub fn validate_config(config: &Config) -> PrepResult<()> {
    let bail = |msg: String| Err(PrepError::Config(msg));

    if config.target_sr == 0 || config.stft_winsize == 0 || config.stft_hopsize == 0 || config.melbins == 0 {
        return bail("target_sr, stft_winsize, stft_hopsize and melbins must be positive".to_string());
    }
    if config.stft_hopsize > config.stft_winsize {
        return bail(format!(
            "stft_hopsize ({}) must not exceed stft_winsize ({})",
            config.stft_hopsize, config.stft_winsize
        ));
    }
    if config.mel_fmin >= config.mel_fmax {
        return bail(format!("mel_fmin ({}) must be < mel_fmax ({})", config.mel_fmin, config.mel_fmax));
    }
    if config.mel_fmax > config.target_sr / 2 {
        return bail(format!("mel_fmax ({}) is above Nyquist for {} Hz", config.mel_fmax, config.target_sr));
    }
    if config.chunklen_seconds.is_nan() || config.chunklen_seconds <= 0.0 {
        return bail(format!("chunklen_seconds must be positive, got {}", config.chunklen_seconds));
    }
    if config.splits.is_empty() {
        return bail("at least one split is required".to_string());
    }
    if let Some(unknown) = config.splits.iter().find(|s| !ALL_SPLITS.contains(&s.as_str())) {
        return bail(format!("unknown split {unknown:?}, expected one of {ALL_SPLITS:?}"));
    }
    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> PrepResult<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_defaults() {
        let config = Config::default();
        assert!((config.quant_secs() - 0.024).abs() < 1e-12);
        assert_eq!(config.data_chunk_length(), 333);
        assert_eq!(config.roll_height(), 179);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_store_basenames() {
        let config = Config::default();
        assert_eq!(
            config.mel_store_path(),
            Path::new("data").join("PuDoMS1_logmel_sr16000_win2048_hop384_mel229_fmin50_fmax8000.fstore")
        );
        assert_eq!(
            config.roll_store_path(),
            Path::new("data").join("PuDoMS1_roll_quant0.024000_keys88_sus.fstore")
        );
        assert_eq!(roll_store_basename("X", 0.01, 88, false), "X_roll_quant0.010000_keys88_nosus.fstore");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"stft_hopsize": 160, "ignore_mel": true}"#).unwrap();
        assert_eq!(config.stft_hopsize, 160);
        assert!(config.ignore_mel);
        assert_eq!(config.melbins, 229);
        assert_eq!(config.compression, Compression::Zstd);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config { mel_fmin: 9_000, ..Config::default() };
        assert!(validate_config(&config).is_err());

        config = Config { mel_fmax: 10_000, ..Config::default() };
        assert!(validate_config(&config).is_err());

        config = Config { stft_hopsize: 4096, ..Config::default() };
        assert!(validate_config(&config).is_err());

        config = Config { chunklen_seconds: 0.0, ..Config::default() };
        assert!(validate_config(&config).is_err());

        config = Config { splits: vec!["dev".to_string()], ..Config::default() };
        assert!(matches!(validate_config(&config), Err(PrepError::Config(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"splits": ["test"], "midi_sus_extend": false}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.splits, vec!["test".to_string()]);
        assert!(!config.midi_sus_extend);
    }
}
