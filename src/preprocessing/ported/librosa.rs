/* PORTED LIBROSA FUNCTIONS (HTK mel scale) */

use ndarray::Array2;

/// Converts a frequency in Hz to HTK mels.
///
/// # Arguments
///
/// * `hz` - A frequency in Hz.
///
/// # Returns
///
/// * The corresponding mel value.
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Converts HTK mels to a frequency in Hz.
///
/// # Arguments
///
/// * `mel` - A mel value.
///
/// # Returns
///
/// * The corresponding frequency in Hz.
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Center frequencies of the `1 + n_fft / 2` real FFT bins.
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    (0..=n_fft / 2)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// `n_mels` frequencies evenly spaced on the mel scale between `fmin` and `fmax`, inclusive.
pub fn mel_frequencies(n_mels: usize, fmin: f32, fmax: f32) -> Vec<f32> {
    let (min_mel, max_mel) = (hz_to_mel(fmin), hz_to_mel(fmax));
    if n_mels == 1 {
        return vec![fmin];
    }
    (0..n_mels)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f32 / (n_mels - 1) as f32))
        .collect()
}

/// Create a triangular mel filterbank, equivalent to
/// `librosa.filters.mel(htk=True, norm=None)`.
///
/// # Arguments
///
/// * `sample_rate` - Sampling rate of the analysed signal.
/// * `n_fft` - FFT size.
/// * `n_mels` - Number of mel bands.
/// * `fmin` - Lowest band edge in Hz.
/// * `fmax` - Highest band edge in Hz.
///
/// # Returns
///
/// * A `(n_mels, 1 + n_fft / 2)` weight matrix.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f32, fmax: f32) -> Array2<f32> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);
    let mel_f = mel_frequencies(n_mels + 2, fmin, fmax);
    let mut weights = Array2::<f32>::zeros((n_mels, fft_freqs.len()));

    for m in 0..n_mels {
        let (lower_edge, center, upper_edge) = (mel_f[m], mel_f[m + 1], mel_f[m + 2]);
        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - lower_edge) / (center - lower_edge);
            let upper = (upper_edge - f) / (upper_edge - center);
            weights[[m, k]] = lower.min(upper).max(0.0);
        }
    }

    weights
}
