//! Uploader settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stashbox_transfer::DEFAULT_CHUNK_SIZE;

use crate::error::ConfigError;

/// Default per-chunk transport timeout in seconds.
pub const DEFAULT_CHUNK_TIMEOUT_SECS: u64 = 300;

/// Default number of files a guest may hold.
pub const DEFAULT_GUEST_FILE_LIMIT: usize = 10;

/// Tunables for upload sessions and the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploaderConfig {
    /// Chunk size in bytes. Zero means [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: u64,
    /// Per-chunk timeout in seconds. Zero disables the timeout.
    pub chunk_timeout: u64,
    /// Maximum sessions transferring at once. `None` is unbounded.
    pub max_concurrent_uploads: Option<usize>,
    /// Files a guest may have stored plus queued. `None` disables the check.
    pub guest_file_limit: Option<usize>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT_SECS,
            max_concurrent_uploads: None,
            guest_file_limit: Some(DEFAULT_GUEST_FILE_LIMIT),
        }
    }
}

impl UploaderConfig {
    /// Loads settings from a JSON file, falling back to defaults when it
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no uploader config, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Chunk size with zero replaced by the default.
    pub fn effective_chunk_size(&self) -> u64 {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }

    pub fn chunk_timeout(&self) -> Option<Duration> {
        (self.chunk_timeout > 0).then(|| Duration::from_secs(self.chunk_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = UploaderConfig::default();
        assert_eq!(config.effective_chunk_size(), 10 * 1024 * 1024);
        assert_eq!(config.chunk_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.max_concurrent_uploads, None);
        assert_eq!(config.guest_file_limit, Some(10));
    }

    #[test]
    fn zero_chunk_size_uses_default() {
        let config = UploaderConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = UploaderConfig {
            chunk_timeout: 0,
            ..Default::default()
        };
        assert_eq!(config.chunk_timeout(), None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: UploaderConfig =
            serde_json::from_str(r#"{"chunkSize":1048576,"maxConcurrentUploads":2}"#).unwrap();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.max_concurrent_uploads, Some(2));
        assert_eq!(config.chunk_timeout, DEFAULT_CHUNK_TIMEOUT_SECS);
        assert_eq!(config.guest_file_limit, Some(10));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = UploaderConfig::load(dir.path().join("uploader.json")).unwrap();
        assert_eq!(config, UploaderConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploader.json");
        std::fs::write(&path, r#"{"guestFileLimit":null,"chunkTimeout":30}"#).unwrap();

        let config = UploaderConfig::load(&path).unwrap();
        assert_eq!(config.guest_file_limit, None);
        assert_eq!(config.chunk_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploader.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            UploaderConfig::load(&path),
            Err(ConfigError::Json(_))
        ));
    }
}
