//! Chunked file reading for resumable uploads.
//!
//! Splits a file into fixed-size, 1-numbered parts, reads them from a
//! local or in-memory source, and tracks transfer throughput.

mod chunked;
mod progress;
mod source;
mod types;
mod validation;

pub use chunked::{ChunkPlan, checksum_bytes, read_chunk};
pub use progress::ThroughputMeter;
pub use source::{LocalFile, MemorySource, ReadFuture, UploadSource, guess_mime_type};
pub use types::{Chunk, ChunkRange};
pub use validation::normalize_folder;

/// Default chunk size: 10 MiB.
///
/// Files at or below this size take the single-request path.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid folder path: {0}")]
    InvalidPath(String),

    #[error("chunk {index} out of range (file has {total} chunks)")]
    ChunkOutOfRange { index: u64, total: u64 },
}
