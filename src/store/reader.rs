use std::fs;
use std::path::Path;

use ndarray::{concatenate, s, Array2, ArrayView2, Axis};

use crate::constants::STORE_HEADER_LEN;
use crate::error::{StoreError, StoreResult};
use crate::store::format::{
    decode_columns, decode_metadata, Header, MetadataEntry, RecordHeader, RecordKind,
    RECORD_HEADER_LEN,
};

/// Read-only view of a store file, limited to what its header marks as
/// committed. Bytes past the last committed record are ignored.
#[derive(Debug)]
pub struct StoreReader {
    header: Header,
    data: Array2<f32>,
    entries: Vec<MetadataEntry>,
}

impl StoreReader {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let bytes = fs::read(path)?;
        let header = Header::decode(&bytes)?;
        let height = header.feature_height as usize;

        let mut chunks: Vec<Array2<f32>> = Vec::new();
        let mut entries = Vec::new();
        let (mut data_records, mut metadata_records) = (0u64, 0u64);
        let mut pos = STORE_HEADER_LEN;

        while data_records < header.data_records || metadata_records < header.metadata_records {
            let record = RecordHeader::decode(bytes.get(pos..).unwrap_or_default())?;
            pos += RECORD_HEADER_LEN;
            let end = pos + record.stored_len as usize;
            let stored = bytes
                .get(pos..end)
                .ok_or_else(|| StoreError::Corrupt("truncated record payload".to_string()))?;
            let raw = header.compression.decompress(stored, record.raw_len as usize)?;
            match record.kind {
                RecordKind::Data => {
                    chunks.push(decode_columns(&raw, height, record.count as usize)?);
                    data_records += 1;
                }
                RecordKind::Metadata => {
                    entries.extend(decode_metadata(&raw, record.count as usize)?);
                    metadata_records += 1;
                }
            }
            pos = end;
        }

        let views: Vec<ArrayView2<f32>> = chunks.iter().map(|c| c.view()).collect();
        let data = if views.is_empty() {
            Array2::zeros((height, 0))
        } else {
            concatenate(Axis(1), &views)
                .map_err(|e| StoreError::Corrupt(format!("data records disagree: {}", e)))?
        };

        if data.ncols() as u64 != header.committed_columns {
            return Err(StoreError::Corrupt(format!(
                "header commits {} columns, records hold {}",
                header.committed_columns,
                data.ncols()
            )));
        }
        if entries.len() as u64 != header.committed_entries {
            return Err(StoreError::Corrupt(format!(
                "header commits {} samples, records hold {}",
                header.committed_entries,
                entries.len()
            )));
        }
        if entries.windows(2).any(|w| w[0].end_column() > w[1].start_column)
            || entries.iter().any(|e| e.width == 0 || e.end_column() > header.committed_columns)
        {
            return Err(StoreError::Corrupt("sample spans overlap or exceed the data".to_string()));
        }

        Ok(Self { header, data, entries })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn feature_height(&self) -> usize {
        self.header.feature_height as usize
    }

    pub fn is_closed(&self) -> bool {
        self.header.closed
    }

    /// Number of committed samples.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_width(&self) -> usize {
        self.data.ncols()
    }

    pub fn boundaries(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.start_column).collect()
    }

    pub fn metadata(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.text.as_str())
    }

    /// Columns of sample `index`.
    pub fn sample(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        let entry = self.entries.get(index)?;
        let (start, end) = (entry.start_column as usize, entry.end_column() as usize);
        Some(self.data.slice(s![.., start..end]))
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }
}
