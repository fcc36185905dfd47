use std::path::Path;

use hound::{SampleFormat, WavReader};
use ndarray::Array1;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::ExtractionError;

/// Load a WAV file as mono `f32` samples at `target_sample_rate`.
///
/// # Arguments
///
/// * `path` - WAV file to read (integer or float PCM, any channel count).
/// * `target_sample_rate` - Output rate; the file is resampled if it differs.
/// * `normalize` - If true, scale so the peak absolute sample is 1.0.
///
/// # Returns
///
/// * The mono samples.
pub fn load_resample_audio<P: AsRef<Path>>(
    path: P,
    target_sample_rate: u32,
    normalize: bool,
) -> Result<Array1<f32>, ExtractionError> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(ExtractionError::InvalidAudio("WAV declares zero channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_sample_value = (2.0_f64.powi(spec.bits_per_sample as i32 - 1) - 1.0) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_sample_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let mut samples = downmix(&interleaved, spec.channels as usize);
    if samples.is_empty() {
        return Err(ExtractionError::InvalidAudio("WAV holds no samples".to_string()));
    }

    if spec.sample_rate != target_sample_rate {
        samples = resample(&samples, spec.sample_rate, target_sample_rate)?;
    }

    if normalize {
        let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        if peak > 0.0 {
            samples.iter_mut().for_each(|s| *s /= peak);
        }
    }

    Ok(Array1::from(samples))
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, ExtractionError> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let resample_ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f64>::new(resample_ratio, 2.0, params, samples.len(), 1)?;
    let channel_data: Vec<Vec<f64>> = vec![samples.iter().map(|&s| s as f64).collect()];
    let expected_len = (samples.len() as f64 * resample_ratio).round() as usize;
    let delay = resampler.output_delay();

    let mut resampled = resampler.process(&channel_data, None)?.into_iter().next().unwrap_or_default();
    // the sinc filter holds back `delay` frames; push zeros through until the tail is out
    while resampled.len() < delay + expected_len {
        let tail = resampler.process_partial::<Vec<f64>>(None, None)?.into_iter().next().unwrap_or_default();
        if tail.is_empty() {
            break;
        }
        resampled.extend(tail);
    }

    let mut out: Vec<f32> = resampled.into_iter().skip(delay).map(|s| s as f32).collect();
    out.resize(expected_len, 0.0);
    log::debug!("Resampled {} -> {} samples ({} Hz -> {} Hz)", samples.len(), out.len(), from_rate, to_rate);
    Ok(out)
}
