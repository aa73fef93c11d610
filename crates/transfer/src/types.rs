/// Position of one chunk within a [`ChunkPlan`](crate::ChunkPlan).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Zero-based position in the partition.
    pub index: u64,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length in bytes; only the last chunk may be shorter than the chunk size.
    pub len: u64,
}

impl ChunkRange {
    /// Multipart part number (1-based).
    pub fn part_number(&self) -> u32 {
        (self.index + 1) as u32
    }
}

/// A chunk of file data ready to be sent as one part.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub range: ChunkRange,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

impl Chunk {
    pub fn part_number(&self) -> u32 {
        self.range.part_number()
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
