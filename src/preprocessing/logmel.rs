use std::path::Path;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::constants::LOG_MEL_EPS;
use crate::error::ExtractionError;
use crate::preprocessing::load_audio::load_resample_audio;
use crate::preprocessing::ported::librosa::mel_filterbank;
use crate::preprocessing::windowed_audio::window_audio_file;

/// Computes `(mel_bins, frames)` log-mel spectrograms from WAV files.
pub struct LogMelExtractor {
    sample_rate: u32,
    window_size: usize,
    hop_size: usize,
    window: Array1<f32>,
    filterbank: Array2<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl LogMelExtractor {
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        hop_size: usize,
        mel_bins: usize,
        fmin: f32,
        fmax: f32,
    ) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(window_size);
        Self {
            sample_rate,
            window_size,
            hop_size,
            window: hann_window(window_size),
            filterbank: mel_filterbank(sample_rate, window_size, mel_bins, fmin, fmax),
            fft,
        }
    }

    pub fn mel_bins(&self) -> usize {
        self.filterbank.nrows()
    }

    /// Log-mel spectrogram of mono samples already at the extractor's rate.
    pub fn logmel(&self, samples: ArrayView1<'_, f32>) -> Array2<f32> {
        let frames = window_audio_file(samples, self.window_size, self.hop_size);
        let n_frames = frames.n_frames();
        let n_bins = self.window_size / 2 + 1;
        let mut power = Array2::<f32>::zeros((n_bins, n_frames));
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.window_size];

        for (t, frame) in frames.enumerate() {
            for (slot, (&x, &w)) in buffer.iter_mut().zip(frame.iter().zip(self.window.iter())) {
                *slot = Complex::new(x * w, 0.0);
            }
            self.fft.process(&mut buffer);
            for (k, value) in buffer.iter().take(n_bins).enumerate() {
                power[[k, t]] = value.norm_sqr();
            }
        }

        self.filterbank.dot(&power).mapv(|v| (v + LOG_MEL_EPS).ln())
    }

    /// Load, resample and normalize `path`, then compute its log-mel spectrogram.
    pub fn extract_file(&self, path: &Path) -> Result<Array2<f32>, ExtractionError> {
        let samples = load_resample_audio(path, self.sample_rate, true)?;
        Ok(self.logmel(samples.view()))
    }
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Array1<f32> {
    Array1::from_iter(
        (0..size).map(|n| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / size as f32).cos()),
    )
}
