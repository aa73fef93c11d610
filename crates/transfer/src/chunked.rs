use sha2::{Digest, Sha256};

use crate::source::UploadSource;
use crate::types::{Chunk, ChunkRange};
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Fixed-size partition of a file into parts.
///
/// A file of `S` bytes with chunk size `C` yields `ceil(S / C)` chunks, all
/// of size `C` except the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Creates a plan. A `chunk_size` of 0 selects [`DEFAULT_CHUNK_SIZE`].
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            file_size,
            chunk_size,
        }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks; zero for an empty file.
    pub fn total_chunks(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size)
    }

    /// Whether the file fits in a single request (`size <= chunk_size`).
    pub fn fits_single_request(&self) -> bool {
        self.file_size <= self.chunk_size
    }

    /// Returns the chunk at `index`, or `None` past the end.
    pub fn chunk(&self, index: u64) -> Option<ChunkRange> {
        if index >= self.total_chunks() {
            return None;
        }
        let offset = index * self.chunk_size;
        let end = std::cmp::min(offset + self.chunk_size, self.file_size);
        Some(ChunkRange {
            index,
            offset,
            len: end - offset,
        })
    }

    /// Iterates every chunk in order.
    pub fn iter(&self) -> impl Iterator<Item = ChunkRange> {
        let plan = *self;
        (0..plan.total_chunks()).filter_map(move |i| plan.chunk(i))
    }

    /// Total bytes covered by the first `count` chunks.
    pub fn bytes_before(&self, count: u64) -> u64 {
        std::cmp::min(count.saturating_mul(self.chunk_size), self.file_size)
    }
}

/// Reads chunk `index` of `plan` from `source` and checksums it.
pub async fn read_chunk(
    source: &dyn UploadSource,
    plan: &ChunkPlan,
    index: u64,
) -> Result<Chunk, TransferError> {
    let range = plan.chunk(index).ok_or(TransferError::ChunkOutOfRange {
        index,
        total: plan.total_chunks(),
    })?;
    let data = source.read_range(range.offset, range.len as usize).await?;
    let checksum = checksum_bytes(&data);
    Ok(Chunk {
        range,
        data,
        checksum,
    })
}
