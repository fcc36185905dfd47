//! Byte layout of a feature store file.
//!
//! A store is a fixed-size header followed by append-only records:
//!
//! ```text
//! [header: 64 bytes][record][record]...
//! record = kind u8 | count u32 | stored_len u32 | raw_len u32 | payload
//! metadata entry = start_column u64 | width u64 | len u32 | utf8
//! ```
//!
//! The header counters are rewritten after each record lands, so a reader
//! that trusts them never sees a torn record. All integers are little-endian.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::constants::{STORE_HEADER_LEN, STORE_MAGIC, STORE_VERSION, ZSTD_LEVEL};
use crate::error::{StoreError, StoreResult};

pub const RECORD_HEADER_LEN: usize = 13;

/// Element type of the numeric array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    F32,
}

impl Dtype {
    fn code(self) -> u8 {
        match self {
            Dtype::F32 => 0,
        }
    }

    fn from_code(code: u8) -> StoreResult<Self> {
        match code {
            0 => Ok(Dtype::F32),
            other => Err(StoreError::Corrupt(format!("unknown dtype code {}", other))),
        }
    }
}

/// Per-record payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Zstd,
}

impl Compression {
    fn code(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zstd => 1,
        }
    }

    fn from_code(code: u8) -> StoreResult<Self> {
        match code {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zstd),
            other => Err(StoreError::Corrupt(format!("unknown codec {}", other))),
        }
    }

    pub fn compress(self, raw: Vec<u8>) -> StoreResult<Vec<u8>> {
        match self {
            Compression::None => Ok(raw),
            Compression::Zstd => Ok(zstd::bulk::compress(&raw, ZSTD_LEVEL)?),
        }
    }

    pub fn decompress(self, stored: &[u8], raw_len: usize) -> StoreResult<Vec<u8>> {
        let raw = match self {
            Compression::None => stored.to_vec(),
            Compression::Zstd => zstd::bulk::decompress(stored, raw_len)
                .map_err(|e| StoreError::Corrupt(format!("zstd: {}", e)))?,
        };
        if raw.len() != raw_len {
            return Err(StoreError::Corrupt(format!(
                "payload inflated to {} bytes, expected {}",
                raw.len(),
                raw_len
            )));
        }
        Ok(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Data,
    Metadata,
}

impl RecordKind {
    fn code(self) -> u8 {
        match self {
            RecordKind::Data => 1,
            RecordKind::Metadata => 2,
        }
    }

    fn from_code(code: u8) -> StoreResult<Self> {
        match code {
            1 => Ok(RecordKind::Data),
            2 => Ok(RecordKind::Metadata),
            other => Err(StoreError::Corrupt(format!("unknown record kind {}", other))),
        }
    }
}

/// File header. The counters describe only fully written records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub dtype: Dtype,
    pub compression: Compression,
    pub feature_height: u32,
    pub data_chunk_length: u32,
    pub metadata_chunk_length: u32,
    pub committed_columns: u64,
    pub committed_entries: u64,
    pub data_records: u64,
    pub metadata_records: u64,
    pub closed: bool,
}

impl Header {
    pub fn new(
        feature_height: u32,
        dtype: Dtype,
        compression: Compression,
        data_chunk_length: u32,
        metadata_chunk_length: u32,
    ) -> Self {
        Self {
            dtype,
            compression,
            feature_height,
            data_chunk_length,
            metadata_chunk_length,
            committed_columns: 0,
            committed_entries: 0,
            data_records: 0,
            metadata_records: 0,
            closed: false,
        }
    }

    pub fn encode(&self) -> [u8; STORE_HEADER_LEN] {
        let mut buf = [0u8; STORE_HEADER_LEN];
        buf[0..8].copy_from_slice(STORE_MAGIC);
        buf[8..10].copy_from_slice(&STORE_VERSION.to_le_bytes());
        buf[10] = self.dtype.code();
        buf[11] = self.compression.code();
        buf[12..16].copy_from_slice(&self.feature_height.to_le_bytes());
        buf[16..20].copy_from_slice(&self.data_chunk_length.to_le_bytes());
        buf[20..24].copy_from_slice(&self.metadata_chunk_length.to_le_bytes());
        buf[24..32].copy_from_slice(&self.committed_columns.to_le_bytes());
        buf[32..40].copy_from_slice(&self.committed_entries.to_le_bytes());
        buf[40..48].copy_from_slice(&self.data_records.to_le_bytes());
        buf[48..56].copy_from_slice(&self.metadata_records.to_le_bytes());
        buf[56] = self.closed as u8;
        buf
    }

    pub fn decode(buf: &[u8]) -> StoreResult<Self> {
        if buf.len() < STORE_HEADER_LEN {
            return Err(StoreError::Corrupt("truncated header".to_string()));
        }
        if &buf[0..8] != STORE_MAGIC {
            return Err(StoreError::Corrupt("bad magic".to_string()));
        }
        let version = u16::from_le_bytes([buf[8], buf[9]]);
        if version != STORE_VERSION {
            return Err(StoreError::Corrupt(format!("unsupported version {}", version)));
        }
        Ok(Self {
            dtype: Dtype::from_code(buf[10])?,
            compression: Compression::from_code(buf[11])?,
            feature_height: read_u32(buf, 12),
            data_chunk_length: read_u32(buf, 16),
            metadata_chunk_length: read_u32(buf, 20),
            committed_columns: read_u64(buf, 24),
            committed_entries: read_u64(buf, 32),
            data_records: read_u64(buf, 40),
            metadata_records: read_u64(buf, 48),
            closed: buf[56] != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: RecordKind,
    /// Columns for data records, entries for metadata records.
    pub count: u32,
    pub stored_len: u32,
    pub raw_len: u32,
}

impl RecordHeader {
    pub fn encode(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        buf[0] = self.kind.code();
        buf[1..5].copy_from_slice(&self.count.to_le_bytes());
        buf[5..9].copy_from_slice(&self.stored_len.to_le_bytes());
        buf[9..13].copy_from_slice(&self.raw_len.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> StoreResult<Self> {
        if buf.len() < RECORD_HEADER_LEN {
            return Err(StoreError::Corrupt("truncated record header".to_string()));
        }
        Ok(Self {
            kind: RecordKind::from_code(buf[0])?,
            count: read_u32(buf, 1),
            stored_len: read_u32(buf, 5),
            raw_len: read_u32(buf, 9),
        })
    }
}

/// Row-major little-endian `f32` bytes of a `(height, columns)` slice.
pub fn encode_columns(slice: ArrayView2<'_, f32>) -> Vec<u8> {
    let mut raw = Vec::with_capacity(slice.len() * 4);
    for &value in slice.iter() {
        raw.extend_from_slice(&value.to_le_bytes());
    }
    raw
}

pub fn decode_columns(raw: &[u8], height: usize, columns: usize) -> StoreResult<Array2<f32>> {
    if raw.len() != height * columns * 4 {
        return Err(StoreError::Corrupt(format!(
            "data record holds {} bytes, expected {}x{} f32",
            raw.len(),
            height,
            columns
        )));
    }
    let values: Vec<f32> = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Array2::from_shape_vec((height, columns), values)
        .map_err(|e| StoreError::Corrupt(format!("data record shape: {}", e)))
}

/// One metadata entry: the sample's column span and its provenance string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub start_column: u64,
    pub width: u64,
    pub text: String,
}

impl MetadataEntry {
    pub fn end_column(&self) -> u64 {
        self.start_column + self.width
    }
}

pub fn encode_metadata(entries: &[MetadataEntry]) -> Vec<u8> {
    let mut raw = Vec::new();
    for entry in entries {
        raw.extend_from_slice(&entry.start_column.to_le_bytes());
        raw.extend_from_slice(&entry.width.to_le_bytes());
        raw.extend_from_slice(&(entry.text.len() as u32).to_le_bytes());
        raw.extend_from_slice(entry.text.as_bytes());
    }
    raw
}

pub fn decode_metadata(raw: &[u8], count: usize) -> StoreResult<Vec<MetadataEntry>> {
    let mut entries = Vec::with_capacity(count);
    let mut pos = 0;
    for _ in 0..count {
        if pos + 20 > raw.len() {
            return Err(StoreError::Corrupt("truncated metadata entry".to_string()));
        }
        let start_column = read_u64(raw, pos);
        let width = read_u64(raw, pos + 8);
        let len = read_u32(raw, pos + 16) as usize;
        pos += 20;
        if pos + len > raw.len() {
            return Err(StoreError::Corrupt("truncated metadata string".to_string()));
        }
        let text = String::from_utf8(raw[pos..pos + len].to_vec())
            .map_err(|e| StoreError::Corrupt(format!("metadata is not UTF-8: {}", e)))?;
        pos += len;
        entries.push(MetadataEntry { start_column, width, text });
    }
    if pos != raw.len() {
        return Err(StoreError::Corrupt("trailing bytes in metadata record".to_string()));
    }
    Ok(entries)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}
