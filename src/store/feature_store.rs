use std::collections::VecDeque;
use std::path::Path;

use ndarray::{concatenate, s, Array2, ArrayView2, Axis};

use crate::error::{StoreError, StoreResult};
use crate::store::chunked_file::ChunkedArrayFile;
use crate::store::format::{Compression, Dtype, MetadataEntry};

/// Where the write buffer stands relative to the data chunk length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Fewer than `data_chunk_length` columns are buffered.
    Accumulating,
    /// At least one full chunk is buffered and must be flushed.
    FlushPending,
    Closed,
}

#[derive(Debug)]
struct PendingSample {
    start: u64,
    end: u64,
    text: String,
}

/// Buffers variable-width matrices in memory and commits them to a
/// [`ChunkedArrayFile`] one full chunk at a time.
///
/// Column offsets are absolute: they count every column ever appended,
/// flushed or not. A metadata entry is handed to the file only once all
/// columns of its sample have been flushed.
#[derive(Debug)]
pub struct FeatureStore {
    file: ChunkedArrayFile,
    write_buffer: Array2<f32>,
    /// Leading columns of `write_buffer` that are already on disk
    flushed_offset: usize,
    pending_samples: VecDeque<PendingSample>,
    ready_metadata: Vec<MetadataEntry>,
    boundaries: Vec<u64>,
    total_columns: u64,
    state: BufferState,
}

impl FeatureStore {
    /// Create the backing file and an empty buffer.
    pub fn create<P: AsRef<Path>>(
        path: P,
        feature_height: usize,
        compression: Compression,
        data_chunk_length: usize,
        metadata_chunk_length: usize,
        err_if_exists: bool,
    ) -> StoreResult<Self> {
        let file = ChunkedArrayFile::create(
            path,
            feature_height,
            Dtype::F32,
            compression,
            data_chunk_length,
            metadata_chunk_length,
            err_if_exists,
        )?;
        Ok(Self::new(file))
    }

    pub fn new(file: ChunkedArrayFile) -> Self {
        let height = file.feature_height();
        Self {
            file,
            write_buffer: Array2::zeros((height, 0)),
            flushed_offset: 0,
            pending_samples: VecDeque::new(),
            ready_metadata: Vec::new(),
            boundaries: Vec::new(),
            total_columns: 0,
            state: BufferState::Accumulating,
        }
    }

    /// Check that `matrix` could be appended, without touching any state.
    pub fn validate(&self, matrix: ArrayView2<'_, f32>) -> StoreResult<()> {
        if self.state == BufferState::Closed {
            return Err(StoreError::UseAfterClose);
        }
        let (rows, columns) = matrix.dim();
        if rows != self.feature_height() {
            return Err(StoreError::ShapeMismatch { expected: self.feature_height(), found: rows });
        }
        if columns == 0 {
            return Err(StoreError::EmptySample);
        }
        Ok(())
    }

    /// Copy `matrix` into the buffer, record its boundary and flush every
    /// complete chunk. A single matrix may span several chunks.
    pub fn append(&mut self, matrix: ArrayView2<'_, f32>, metadata: &str) -> StoreResult<()> {
        self.validate(matrix)?;

        let width = matrix.ncols() as u64;
        let pending = self.write_buffer.slice(s![.., self.flushed_offset..]);
        let merged = concatenate(Axis(1), &[pending, matrix.view()])
            .map_err(|e| StoreError::InvalidParameter(format!("buffer concatenation: {}", e)))?;
        self.write_buffer = merged;
        self.flushed_offset = 0;
        let start = self.total_columns;
        self.total_columns += width;
        self.boundaries.push(start);
        self.pending_samples.push_back(PendingSample {
            start,
            end: self.total_columns,
            text: metadata.to_string(),
        });

        self.update_state();
        while self.state == BufferState::FlushPending {
            self.flush_chunk()?;
        }
        self.compact();
        Ok(())
    }

    /// Flush the partial last chunk and all remaining metadata, then close
    /// the file. A second call fails with [`StoreError::UseAfterClose`].
    pub fn close(&mut self) -> StoreResult<()> {
        if self.state == BufferState::Closed {
            return Err(StoreError::UseAfterClose);
        }
        if self.buffered_columns() > 0 {
            self.file.flush_data(self.write_buffer.slice(s![.., self.flushed_offset..]))?;
        }
        self.write_buffer = Array2::zeros((self.feature_height(), 0));
        self.flushed_offset = 0;
        self.release_flushed_samples();
        let chunk = self.file.metadata_chunk_length();
        while !self.ready_metadata.is_empty() {
            let n = chunk.min(self.ready_metadata.len());
            let batch: Vec<MetadataEntry> = self.ready_metadata.drain(..n).collect();
            self.file.flush_metadata(&batch)?;
        }
        self.file.close()?;
        self.state = BufferState::Closed;
        Ok(())
    }

    fn flush_chunk(&mut self) -> StoreResult<()> {
        let chunk = self.file.data_chunk_length();
        let start = self.flushed_offset;
        self.file.flush_data(self.write_buffer.slice(s![.., start..start + chunk]))?;
        self.flushed_offset += chunk;

        self.release_flushed_samples();
        let metadata_chunk = self.file.metadata_chunk_length();
        while self.ready_metadata.len() >= metadata_chunk {
            let batch: Vec<MetadataEntry> = self.ready_metadata.drain(..metadata_chunk).collect();
            self.file.flush_metadata(&batch)?;
        }

        self.update_state();
        Ok(())
    }

    /// Drop the already flushed leading columns in a single copy.
    fn compact(&mut self) {
        if self.flushed_offset == 0 {
            return;
        }
        let remainder = self.write_buffer.slice(s![.., self.flushed_offset..]).to_owned();
        self.write_buffer = remainder;
        self.flushed_offset = 0;
    }

    /// Move samples whose columns are all on disk to the metadata queue.
    fn release_flushed_samples(&mut self) {
        let flushed = self.file.committed_length();
        while self.pending_samples.front().is_some_and(|p| p.end <= flushed) {
            if let Some(sample) = self.pending_samples.pop_front() {
                self.ready_metadata.push(MetadataEntry {
                    start_column: sample.start,
                    width: sample.end - sample.start,
                    text: sample.text,
                });
            }
        }
    }

    fn update_state(&mut self) {
        self.state = if self.buffered_columns() >= self.file.data_chunk_length() {
            BufferState::FlushPending
        } else {
            BufferState::Accumulating
        };
    }

    pub fn feature_height(&self) -> usize {
        self.file.feature_height()
    }

    pub fn data_chunk_length(&self) -> usize {
        self.file.data_chunk_length()
    }

    /// Number of samples appended so far.
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Start column of every appended sample.
    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    pub fn total_columns(&self) -> u64 {
        self.total_columns
    }

    /// Columns appended but not yet on disk.
    pub fn buffered_columns(&self) -> usize {
        self.write_buffer.ncols() - self.flushed_offset
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn file(&self) -> &ChunkedArrayFile {
        &self.file
    }
}

impl Drop for FeatureStore {
    fn drop(&mut self) {
        if self.state != BufferState::Closed {
            log::warn!(
                "Store {} dropped without close; {} buffered columns are lost",
                self.file.path().display(),
                self.buffered_columns()
            );
        }
    }
}
