// Audio
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const STFT_WINSIZE: usize = 2048;
pub const STFT_HOPSIZE: usize = 384;
pub const MEL_BINS: usize = 229;
pub const MEL_FMIN: u32 = 50;
pub const MEL_FMAX: u32 = 8_000;
pub const LOG_MEL_EPS: f32 = 1e-6;
pub const AUDIO_EXT: &str = ".wav";

// MIDI Conversion
pub const MIDI_OFFSET: usize = 21;
pub const NUM_MIDI_VALUES: usize = 88;
pub const PEDAL_THRESHOLD: u8 = 64;
pub const CC_SUSTAIN: u8 = 64;
pub const CC_TENUTO: u8 = 66;
pub const CC_SOFT: u8 = 67;
pub const MIDI_EXTS: [&str; 2] = [".mid", ".midi"];
/// onsets + frames + sustain, soft and tenuto pedals
pub const ROLL_HEIGHT: usize = 3 + 2 * NUM_MIDI_VALUES;

// Dataset
pub const DATASET_NAME: &str = "PuDoMS1";
pub const DATASET_CSV_NAME: &str = "pudoms.csv";
pub const ALL_SPLITS: [&str; 3] = ["train", "validation", "test"];

// Store
pub const CHUNKLEN_SECONDS: f32 = 8.0;
pub const STORE_EXT: &str = "fstore";
pub const STORE_MAGIC: &[u8; 8] = b"PFSTORE\0";
pub const STORE_VERSION: u16 = 1;
pub const STORE_HEADER_LEN: usize = 64;
pub const ZSTD_LEVEL: i32 = 3;
pub const PROGRESS_EVERY: usize = 5;
