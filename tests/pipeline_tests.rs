//! Orchestration tests: skip policy with stub extractors and a full run on
//! synthesized WAV and MIDI files

use std::path::Path;

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use ndarray::Array2;
use piano_feature_store::error::{ExtractionError, PrepError, StoreError};
use piano_feature_store::store::{Compression, FeatureStore, StoreReader};
use piano_feature_store::{
    process_dataset, run, Config, DualStreamCommitter, PuDoMS, RollExtractor, SpectrogramExtractor,
};
use tempfile::tempdir;

/// Reads the number of columns to produce from the file itself.
struct StubExtractor {
    height: usize,
}

impl StubExtractor {
    fn matrix(&self, path: &Path) -> Result<Array2<f32>, ExtractionError> {
        let text = std::fs::read_to_string(path)?;
        let width: usize = text
            .trim()
            .parse()
            .map_err(|_| ExtractionError::InvalidMidi(format!("unparsable stub {text:?}")))?;
        Ok(Array2::ones((self.height, width)))
    }
}

impl SpectrogramExtractor for StubExtractor {
    fn feature_height(&self) -> usize {
        self.height
    }

    fn extract(&self, audio_path: &Path) -> Result<Array2<f32>, ExtractionError> {
        self.matrix(audio_path)
    }
}

impl RollExtractor for StubExtractor {
    fn extract(&self, midi_path: &Path) -> Result<Array2<f32>, ExtractionError> {
        self.matrix(midi_path)
    }
}

fn write_index(root: &Path, rows: &[(&str, &str)]) {
    let mut csv = String::from("File_Number,Split,Duration,Composer,Title\n");
    for (id, split) in rows {
        csv.push_str(&format!("{id},{split},1.0,Someone,Piece {id}\n"));
    }
    std::fs::write(root.join("pudoms.csv"), csv).unwrap();
}

#[test]
fn test_failing_samples_are_skipped() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_index(
        root,
        &[("a", "train"), ("b", "train"), ("c", "test"), ("d", "train"), ("e", "train"), ("f", "train"), ("g", "train")],
    );

    // a: fine. b: no MIDI. c: filtered split. d: broken MIDI. e: roll wider than audio.
    // f: fine, uses .midi. g: zero frames
    for (id, audio, midi, ext) in [
        ("a", "6", "4", "mid"),
        ("c", "6", "6", "mid"),
        ("d", "6", "oops", "mid"),
        ("e", "3", "5", "mid"),
        ("f", "5", "5", "midi"),
        ("g", "0", "0", "mid"),
    ] {
        std::fs::write(root.join(format!("{id}.wav")), audio).unwrap();
        std::fs::write(root.join(format!("{id}.{ext}")), midi).unwrap();
    }
    std::fs::write(root.join("b.wav"), "6").unwrap();

    let dataset = PuDoMS::open(root, &["train".to_string()]).unwrap();
    let mel_path = root.join("mel.fstore");
    let roll_path = root.join("roll.fstore");
    let committer = DualStreamCommitter::new(
        Some(FeatureStore::create(&mel_path, 3, Compression::Zstd, 4, 4, true).unwrap()),
        FeatureStore::create(&roll_path, 2, Compression::Zstd, 4, 4, true).unwrap(),
    );

    let summary = process_dataset(
        &dataset,
        Some(&StubExtractor { height: 3 } as &dyn SpectrogramExtractor),
        &StubExtractor { height: 2 },
        committer,
    )
    .unwrap();
    assert_eq!(summary.committed, 2);
    assert_eq!(summary.skipped, 4);

    for path in [&mel_path, &roll_path] {
        let reader = StoreReader::open(path).unwrap();
        assert!(reader.is_closed());
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.boundaries(), vec![0, 6]);
        assert_eq!(reader.total_width(), 11);
        assert!(reader.metadata(0).unwrap().starts_with("('a'"));
        assert!(reader.metadata(1).unwrap().starts_with("('f'"));
    }
}

#[test]
fn test_roll_only_run() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_index(root, &[("a", "train"), ("b", "validation")]);
    std::fs::write(root.join("a.mid"), "3").unwrap();
    std::fs::write(root.join("b.mid"), "2").unwrap();

    let dataset = PuDoMS::open(root, &["train".to_string(), "validation".to_string()]).unwrap();
    let roll_path = root.join("roll.fstore");
    let committer =
        DualStreamCommitter::new(None, FeatureStore::create(&roll_path, 2, Compression::Zstd, 4, 4, true).unwrap());

    let summary = process_dataset(&dataset, None, &StubExtractor { height: 2 }, committer).unwrap();
    assert_eq!(summary.committed, 2);

    let reader = StoreReader::open(&roll_path).unwrap();
    assert_eq!(reader.boundaries(), vec![0, 3]);
}

#[test]
fn test_shape_mismatch_aborts_the_run() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_index(root, &[("a", "train")]);
    std::fs::write(root.join("a.mid"), "3").unwrap();

    let dataset = PuDoMS::open(root, &["train".to_string()]).unwrap();
    let committer = DualStreamCommitter::new(
        None,
        FeatureStore::create(root.join("roll.fstore"), 7, Compression::Zstd, 4, 4, true).unwrap(),
    );

    let result = process_dataset(&dataset, None, &StubExtractor { height: 2 }, committer);
    assert!(result.is_err());
}

fn write_wav(path: &Path, seconds: f32, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let n = (seconds * sample_rate as f32) as usize;
    for i in 0..n {
        let t = i as f32 / sample_rate as f32;
        let s = (2.0 * std::f32::consts::PI * 261.63 * t).sin() * 0.5;
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Middle C from 0.1 s to 0.5 s with the sustain pedal held until 0.6 s.
fn write_midi(path: &Path) {
    let midi = |message| TrackEventKind::Midi { channel: u4::new(0), message };
    let mut smf = Smf::new(Header { format: Format::SingleTrack, timing: Timing::Metrical(u15::new(480)) });
    let mut track = Track::new();
    for (delta, kind) in [
        (0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))),
        (0, midi(MidiMessage::Controller { controller: u7::new(64), value: u7::new(127) })),
        (96, midi(MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(100) })),
        (384, midi(MidiMessage::NoteOff { key: u7::new(60), vel: u7::new(0) })),
        (96, midi(MidiMessage::Controller { controller: u7::new(64), value: u7::new(0) })),
        (0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
    ] {
        track.push(TrackEvent { delta: u28::new(delta), kind });
    }
    smf.tracks.push(track);
    smf.save(path).unwrap();
}

#[test]
fn test_end_to_end_run() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("PuDoMS1");
    std::fs::create_dir_all(&root).unwrap();
    write_index(&root, &[("001", "train"), ("002", "test"), ("003", "test")]);
    write_wav(&root.join("001.wav"), 1.0, 16_000);
    write_midi(&root.join("001.mid"));
    write_wav(&root.join("002.wav"), 1.0, 22_050);
    write_midi(&root.join("002.midi"));
    // 003 has no files at all

    let config = Config {
        input_path: root.clone(),
        output_dir: dir.path().join("out"),
        chunklen_seconds: 0.5,
        ..Config::default()
    };
    let summary = run(&config).unwrap();
    assert_eq!(summary.committed, 2);
    assert_eq!(summary.skipped, 1);

    let mel = StoreReader::open(config.mel_store_path()).unwrap();
    let roll = StoreReader::open(config.roll_store_path()).unwrap();
    assert_eq!(mel.feature_height(), 229);
    assert_eq!(roll.feature_height(), 179);
    assert_eq!(mel.len(), 2);
    assert_eq!(mel.boundaries(), roll.boundaries());

    // 1 s at 16 kHz with hop 384
    let frames = 1 + 16_000 / 384;
    let first_roll = roll.sample(0).unwrap();
    assert_eq!(mel.sample(0).unwrap().ncols(), frames);
    assert_eq!(first_roll.ncols(), frames);
    assert!(mel.sample(0).unwrap().iter().all(|v| v.is_finite()));

    // onset row of key 60 at round(0.1 / 0.024) = 4, sustained frames until round(0.6 / 0.024) = 25
    let key_row = 60 - 21;
    assert!((first_roll[[key_row, 4]] - 100.0 / 127.0).abs() < 1e-6);
    assert_eq!(first_roll[[88 + key_row, 24]], 1.0);
    assert_eq!(first_roll[[88 + key_row, 25]], 0.0);
    assert_eq!(first_roll[[176, 0]], 1.0);
    assert_eq!(first_roll[[176, 30]], 0.0);

    // a second run refuses to overwrite
    assert!(matches!(run(&config), Err(PrepError::Store(StoreError::AlreadyExists(_)))));
}
