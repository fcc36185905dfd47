//! PuDoMS dataset index

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::{AUDIO_EXT, DATASET_CSV_NAME, MIDI_EXTS};
use crate::error::PrepResult;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "File_Number")]
    file_number: String,
    #[serde(rename = "Split")]
    split: String,
    #[serde(rename = "Duration")]
    duration: String,
    #[serde(rename = "Composer")]
    composer: String,
    #[serde(rename = "Title")]
    title: String,
}

/// One performance: a WAV recording and its aligned MIDI file.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetEntry {
    /// Path relative to the dataset root, without extension
    pub relative_path: String,
    pub split: String,
    pub duration: String,
    pub composer: String,
    pub title: String,
}

impl DatasetEntry {
    pub fn basename(&self) -> &str {
        Path::new(&self.relative_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.relative_path)
    }

    /// Provenance string stored next to each sample, rendered as a Python
    /// tuple literal that `ast.literal_eval` accepts. A numeric duration is
    /// written as a float.
    pub fn metadata_string(&self) -> String {
        let duration = match self.duration.parse::<f64>() {
            Ok(seconds) if seconds.is_finite() => format!("{seconds:?}"),
            _ => python_str_literal(&self.duration),
        };
        format!(
            "({}, {}, {}, {}, {})",
            python_str_literal(self.basename()),
            python_str_literal(&self.split),
            duration,
            python_str_literal(&self.composer),
            python_str_literal(&self.title)
        )
    }
}

/// Quote `text` the way Python's `repr` does: single quotes unless the text
/// contains a single quote and no double quote.
fn python_str_literal(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[derive(Debug, Clone)]
pub struct PuDoMS {
    root: PathBuf,
    entries: Vec<DatasetEntry>,
}

impl PuDoMS {
    /// Read `pudoms.csv` under `root`, keeping rows whose split is in
    /// `splits`, in file order.
    pub fn open<P: AsRef<Path>>(root: P, splits: &[String]) -> PrepResult<Self> {
        let root = root.as_ref().to_path_buf();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(root.join(DATASET_CSV_NAME))?;

        let mut entries = vec![];
        for row in reader.deserialize::<CsvRow>() {
            let row = row?;
            if !splits.iter().any(|s| *s == row.split) {
                continue;
            }
            entries.push(DatasetEntry {
                relative_path: row.file_number,
                split: row.split,
                duration: row.duration,
                composer: row.composer,
                title: row.title,
            });
        }
        log::debug!("{} entries selected from {}", entries.len(), root.display());
        Ok(Self { root, entries })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn audio_path(&self, entry: &DatasetEntry) -> PathBuf {
        self.root.join(format!("{}{}", entry.relative_path, AUDIO_EXT))
    }

    /// First existing MIDI file among `basename.mid` and `basename.midi`.
    pub fn midi_path(&self, entry: &DatasetEntry) -> Option<PathBuf> {
        resolve_midi_path(&self.root, entry.basename())
    }
}

pub fn resolve_midi_path(root: &Path, basename: &str) -> Option<PathBuf> {
    MIDI_EXTS
        .iter()
        .map(|ext| root.join(format!("{basename}{ext}")))
        .find(|path| path.is_file())
}
