//! Shared types for the upload pipeline.

use serde::Serialize;

// Concurrent block uploads per file
pub const MAX_CONCURRENT_UPLOADS: usize = 4;

/// Progress snapshot emitted after every completed block, whether staged
/// over the network or skipped during resume.
#[derive(Debug, Clone, Serialize)]
pub struct UploadProgress {
    pub upload_id: String,
    pub percent: u32,
    pub completed_blocks: u32,
    pub total_blocks: u32,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub(crate) fn new(
        upload_id: &str,
        completed_blocks: u32,
        total_blocks: u32,
        uploaded_bytes: u64,
        total_bytes: u64,
    ) -> Self {
        let percent = if total_blocks == 0 {
            100
        } else {
            completed_blocks * 100 / total_blocks
        };
        Self {
            upload_id: upload_id.to_string(),
            percent,
            completed_blocks,
            total_blocks,
            uploaded_bytes,
            total_bytes,
        }
    }
}

/// Per-block progress callback.
pub type ProgressCallback = Box<dyn Fn(UploadProgress) + Send + Sync>;

/// Batch-level percentage callback.
pub type BatchProgressCallback = Box<dyn Fn(u32) + Send + Sync>;

/// Options for a new upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Content type recorded on the committed blob.
    pub content_type: String,
    /// Cache-control recorded on the committed blob.
    pub cache_control: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            content_type: "application/octet-stream".to_string(),
            cache_control: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_tracks_completed_blocks() {
        let progress = UploadProgress::new("u-1", 1, 3, 4, 10);
        assert_eq!(progress.percent, 33);

        let done = UploadProgress::new("u-1", 3, 3, 10, 10);
        assert_eq!(done.percent, 100);
    }

    #[test]
    fn zero_block_upload_reports_complete() {
        assert_eq!(UploadProgress::new("u-1", 0, 0, 0, 0).percent, 100);
    }
}
