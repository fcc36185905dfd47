use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ndarray::ArrayView2;

use crate::constants::STORE_HEADER_LEN;
use crate::error::{StoreError, StoreResult};
use crate::store::format::{
    encode_columns, encode_metadata, Compression, Dtype, Header, MetadataEntry, RecordHeader,
    RecordKind,
};

/// Durable container for one growable `(feature_height, columns)` array and
/// its parallel metadata strings.
///
/// Each flush appends one record and only then advances the header counters,
/// so a crash between the two leaves the previously committed content intact.
#[derive(Debug)]
pub struct ChunkedArrayFile {
    path: PathBuf,
    file: Option<File>,
    header: Header,
    end: u64,
    last_boundary: Option<u64>,
}

impl ChunkedArrayFile {
    /// Create a new store file.
    ///
    /// # Arguments
    ///
    /// * `path` - Output file. With `err_if_exists` an occupied path is never touched.
    /// * `feature_height` - Number of rows of every stored column.
    /// * `data_chunk_length` - Columns per data record.
    /// * `metadata_chunk_length` - Entries per metadata record.
    pub fn create<P: AsRef<Path>>(
        path: P,
        feature_height: usize,
        dtype: Dtype,
        compression: Compression,
        data_chunk_length: usize,
        metadata_chunk_length: usize,
        err_if_exists: bool,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let feature_height = positive_u32("feature_height", feature_height)?;
        let data_chunk_length = positive_u32("data_chunk_length", data_chunk_length)?;
        let metadata_chunk_length = positive_u32("metadata_chunk_length", metadata_chunk_length)?;

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if err_if_exists {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        let mut file = options.open(&path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.clone()),
            _ => StoreError::Io(e),
        })?;

        let header = Header::new(
            feature_height,
            dtype,
            compression,
            data_chunk_length,
            metadata_chunk_length,
        );
        file.write_all(&header.encode())?;
        log::debug!(
            "Created store {} (height {}, chunk {} columns)",
            path.display(),
            feature_height,
            data_chunk_length
        );

        Ok(Self {
            path,
            file: Some(file),
            header,
            end: STORE_HEADER_LEN as u64,
            last_boundary: None,
        })
    }

    /// Append columns to the numeric array.
    pub fn flush_data(&mut self, slice: ArrayView2<'_, f32>) -> StoreResult<()> {
        if self.file.is_none() {
            return Err(StoreError::UseAfterClose);
        }
        let (rows, columns) = slice.dim();
        if rows != self.feature_height() {
            return Err(StoreError::ShapeMismatch { expected: self.feature_height(), found: rows });
        }
        if columns == 0 {
            return Ok(());
        }

        let count = checked_u32("data record columns", columns)?;
        self.write_record(RecordKind::Data, count, encode_columns(slice))?;
        self.header.committed_columns += columns as u64;
        self.header.data_records += 1;
        self.write_header()?;
        log::debug!(
            "{}: flushed {} columns ({} committed)",
            self.path.display(),
            columns,
            self.header.committed_columns
        );
        Ok(())
    }

    /// Append entries to the metadata array. Every entry must start inside
    /// the already committed columns, after the previous entry.
    pub fn flush_metadata(&mut self, entries: &[MetadataEntry]) -> StoreResult<()> {
        if self.file.is_none() {
            return Err(StoreError::UseAfterClose);
        }
        if entries.is_empty() {
            return Ok(());
        }

        let mut previous = self.last_boundary;
        for entry in entries {
            if previous.is_some_and(|p| entry.start_column <= p) {
                return Err(StoreError::InvalidParameter(format!(
                    "sample boundary {} does not increase",
                    entry.start_column
                )));
            }
            if entry.width == 0 || entry.end_column() > self.header.committed_columns {
                return Err(StoreError::InvalidParameter(format!(
                    "sample {}..{} is not within the {} committed columns",
                    entry.start_column,
                    entry.end_column(),
                    self.header.committed_columns
                )));
            }
            previous = Some(entry.start_column);
        }

        let count = checked_u32("metadata record entries", entries.len())?;
        self.write_record(RecordKind::Metadata, count, encode_metadata(entries))?;
        self.last_boundary = previous;
        self.header.committed_entries += entries.len() as u64;
        self.header.metadata_records += 1;
        self.write_header()
    }

    /// Mark the file closed, sync it and release the handle.
    pub fn close(&mut self) -> StoreResult<()> {
        if self.file.is_none() {
            return Err(StoreError::UseAfterClose);
        }
        self.header.closed = true;
        self.write_header()?;
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        log::debug!(
            "Closed store {}: {} columns, {} samples",
            self.path.display(),
            self.header.committed_columns,
            self.header.committed_entries
        );
        Ok(())
    }

    fn write_record(&mut self, kind: RecordKind, count: u32, raw: Vec<u8>) -> StoreResult<()> {
        let raw_len = checked_u32("record payload", raw.len())?;
        let payload = self.header.compression.compress(raw)?;
        let record = RecordHeader {
            kind,
            count,
            stored_len: checked_u32("stored payload", payload.len())?,
            raw_len,
        };
        let file = self.file.as_mut().ok_or(StoreError::UseAfterClose)?;
        file.seek(SeekFrom::Start(self.end))?;
        file.write_all(&record.encode())?;
        file.write_all(&payload)?;
        // The record must be durable before the header points past it.
        file.sync_data()?;
        self.end = file.stream_position()?;
        Ok(())
    }

    fn write_header(&mut self) -> StoreResult<()> {
        let encoded = self.header.encode();
        let file = self.file.as_mut().ok_or(StoreError::UseAfterClose)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encoded)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn feature_height(&self) -> usize {
        self.header.feature_height as usize
    }

    pub fn data_chunk_length(&self) -> usize {
        self.header.data_chunk_length as usize
    }

    pub fn metadata_chunk_length(&self) -> usize {
        self.header.metadata_chunk_length as usize
    }

    pub fn committed_length(&self) -> u64 {
        self.header.committed_columns
    }

    pub fn committed_entries(&self) -> u64 {
        self.header.committed_entries
    }

    pub fn data_flushes(&self) -> u64 {
        self.header.data_records
    }

    pub fn metadata_flushes(&self) -> u64 {
        self.header.metadata_records
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}

fn positive_u32(what: &str, value: usize) -> StoreResult<u32> {
    if value == 0 {
        return Err(StoreError::InvalidParameter(format!("{} must be positive", what)));
    }
    checked_u32(what, value)
}

fn checked_u32(what: &str, value: usize) -> StoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidParameter(format!("{} {} exceeds u32", what, value)))
}
