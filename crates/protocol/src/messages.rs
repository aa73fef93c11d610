use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Multipart upload
// ---------------------------------------------------------------------------

/// Opens a multipart upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMultipartRequest {
    pub file_name: String,
    #[serde(default)]
    pub folder: String,
    pub content_type: String,
}

/// Identifiers assigned by the remote store for a new multipart upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMultipartResponse {
    pub upload_id: String,
    pub key: String,
}

/// Acknowledgement of one uploaded part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPartResponse {
    pub etag: String,
}

/// A part the remote store has acknowledged. Part numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Finalises a multipart upload and registers the file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultipartRequest {
    pub upload_id: String,
    pub key: String,
    pub parts: Vec<CompletedPart>,
    pub file_name: String,
    #[serde(default)]
    pub folder: String,
    pub size: u64,
    pub content_type: String,
}

impl CompleteMultipartRequest {
    /// Part numbers must be exactly `1..=n` in order.
    pub fn parts_are_contiguous(&self) -> bool {
        self.parts
            .iter()
            .enumerate()
            .all(|(i, p)| p.part_number as usize == i + 1)
    }
}

/// Discards a multipart upload and its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortMultipartRequest {
    pub upload_id: String,
    pub key: String,
}

// ---------------------------------------------------------------------------
// File management
// ---------------------------------------------------------------------------

/// Moves a file record to another virtual folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveFileRequest {
    pub folder: String,
}

/// Creates a zero-byte folder marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFolderRequest {
    pub path: String,
}
