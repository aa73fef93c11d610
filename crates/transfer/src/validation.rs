use crate::TransferError;

/// Normalises a virtual folder path.
///
/// Leading/trailing slashes, empty segments and `.` segments are dropped,
/// so `"/docs//2024/"` becomes `"docs/2024"` and `""` or `"/"` is the root.
///
/// Rejects:
/// - Parent directory segments (`..`)
/// - Windows drive prefixes (`C:`) and backslashes
/// - Control characters
pub fn normalize_folder(folder: &str) -> Result<String, TransferError> {
    if folder.contains('\\') {
        return Err(TransferError::InvalidPath(format!(
            "backslash not allowed: {folder}"
        )));
    }
    if folder.chars().any(char::is_control) {
        return Err(TransferError::InvalidPath(format!(
            "control character not allowed: {folder:?}"
        )));
    }

    let mut segments = Vec::new();
    for segment in folder.trim().split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {folder}"
                )));
            }
            s if segments.is_empty() && is_drive_prefix(s) => {
                return Err(TransferError::InvalidPath(format!(
                    "drive prefix not allowed: {folder}"
                )));
            }
            s => segments.push(s),
        }
    }

    Ok(segments.join("/"))
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
