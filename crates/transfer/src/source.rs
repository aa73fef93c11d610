use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;

/// Boxed future returned by [`UploadSource::read_range`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + 'a>>;

/// Read-only handle to the bytes being uploaded.
///
/// Implementations must tolerate repeated and out-of-order range reads:
/// a resumed or retried session re-reads chunks it already read once.
pub trait UploadSource: Send + Sync {
    /// Display name, used as the remote file name.
    fn name(&self) -> &str;

    /// Total size in bytes. Fixed for the lifetime of the source.
    fn size(&self) -> u64;

    /// MIME type sent with the upload.
    fn mime_type(&self) -> &str;

    /// Reads exactly `len` bytes starting at `offset`.
    fn read_range(&self, offset: u64, len: usize) -> ReadFuture<'_>;
}

/// Guesses a MIME type from a file name, defaulting to `application/octet-stream`.
pub fn guess_mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

// ---------------------------------------------------------------------------
// LocalFile
// ---------------------------------------------------------------------------

/// A file on local disk. Each range read opens its own handle, so reads
/// from different sessions never share a cursor.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
    mime_type: String,
}

impl LocalFile {
    /// Stats `path` and captures its size, name and MIME type.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let mime_type = guess_mime_type(&name);

        Ok(Self {
            path,
            name,
            size: metadata.len(),
            mime_type,
        })
    }

    /// Overrides the display name (the MIME type is kept).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UploadSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read_range(&self, offset: u64, len: usize) -> ReadFuture<'_> {
        Box::pin(async move {
            let mut file = tokio::fs::File::open(&self.path).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf).await?;
            Ok(buf)
        })
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// An in-memory blob, e.g. data already held by the UI layer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    mime_type: String,
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = guess_mime_type(&name);
        Self {
            name,
            mime_type,
            data: data.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

impl UploadSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read_range(&self, offset: u64, len: usize) -> ReadFuture<'_> {
        Box::pin(async move {
            let start = offset as usize;
            let end = start.checked_add(len).filter(|&e| e <= self.data.len());
            match end {
                Some(end) => Ok(self.data[start..end].to_vec()),
                None => Err(TransferError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("range {start}+{len} past end of {} bytes", self.data.len()),
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[tokio::test]
    async fn local_file_metadata() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "photo.png", b"0123456789");

        let file = LocalFile::open(&path).await.unwrap();
        assert_eq!(file.name(), "photo.png");
        assert_eq!(file.size(), 10);
        assert_eq!(file.mime_type(), "image/png");
    }

    #[tokio::test]
    async fn local_file_reads_ranges_in_any_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "data.bin", b"0123456789");
        let file = LocalFile::open(&path).await.unwrap();

        assert_eq!(file.read_range(6, 4).await.unwrap(), b"6789");
        assert_eq!(file.read_range(0, 3).await.unwrap(), b"012");
        assert_eq!(file.read_range(6, 4).await.unwrap(), b"6789");
    }

    #[tokio::test]
    async fn local_file_short_read_is_error() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "data.bin", b"0123");
        let file = LocalFile::open(&path).await.unwrap();
        assert!(file.read_range(2, 10).await.is_err());
    }

    #[tokio::test]
    async fn local_file_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(LocalFile::open(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn local_file_name_override() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "tmp123.pdf", b"x");
        let file = LocalFile::open(&path).await.unwrap().with_name("report.pdf");
        assert_eq!(file.name(), "report.pdf");
        assert_eq!(file.mime_type(), "application/pdf");
    }

    #[tokio::test]
    async fn memory_source_bounds() {
        let src = MemorySource::new("a.txt", b"hello".to_vec());
        assert_eq!(src.mime_type(), "text/plain");
        assert_eq!(src.read_range(1, 3).await.unwrap(), b"ell");
        assert_eq!(src.read_range(5, 0).await.unwrap(), b"");
        assert!(src.read_range(3, 3).await.is_err());
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(guess_mime_type("noext"), "application/octet-stream");
        assert_eq!(guess_mime_type("archive.zip"), "application/zip");
    }
}
