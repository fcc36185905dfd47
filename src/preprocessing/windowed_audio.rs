use ndarray::{s, Array1, ArrayView1};

/// Frames of a centred STFT: the signal is reflect-padded by half a window
/// on both sides and frame `t` starts at `t * hop_size` of the padded signal.
pub struct WindowedAudio {
    audio: Array1<f32>,
    window_size: usize,
    hop_size: usize,
    index: usize,
    n_frames: usize,
}

impl WindowedAudio {
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }
}

impl Iterator for WindowedAudio {
    type Item = Array1<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.n_frames {
            return None;
        }
        let start = self.index * self.hop_size;
        let end_index = (start + self.window_size).min(self.audio.len());
        let mut window = Array1::<f32>::zeros(self.window_size);
        window
            .slice_mut(s![..end_index - start])
            .assign(&self.audio.slice(s![start..end_index]));
        self.index += 1;
        Some(window)
    }
}

/// Number of centred frames for `n_samples` samples: `1 + n_samples / hop_size`.
pub fn frame_count(n_samples: usize, hop_size: usize) -> usize {
    1 + n_samples / hop_size
}

pub fn window_audio_file(audio: ArrayView1<'_, f32>, window_size: usize, hop_size: usize) -> WindowedAudio {
    let n_frames = frame_count(audio.len(), hop_size);
    WindowedAudio {
        audio: reflect_pad(audio, window_size / 2),
        window_size,
        hop_size,
        index: 0,
        n_frames,
    }
}

/// Mirror `pad` samples onto each end without repeating the edge sample.
/// Falls back to zeros where the signal is too short to mirror.
pub fn reflect_pad(audio: ArrayView1<'_, f32>, pad: usize) -> Array1<f32> {
    let n = audio.len();
    let mut padded = Array1::<f32>::zeros(n + 2 * pad);
    padded.slice_mut(s![pad..pad + n]).assign(&audio);
    for i in 1..=pad {
        if i < n {
            padded[pad - i] = audio[i];
            padded[pad + n - 1 + i] = audio[n - 1 - i];
        }
    }
    padded
}
