pub mod load_audio;
pub mod logmel;
pub mod windowed_audio;
pub mod ported {
    pub mod librosa;
}

pub use logmel::LogMelExtractor;
