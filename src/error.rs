//! Error taxonomy for upload operations.

use std::path::PathBuf;

use reqwest::StatusCode;

/// Errors surfaced by the upload client.
///
/// Only [`UploadError::Network`] failures that never reached an HTTP
/// response are retryable; everything else surfaces immediately.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The request failed at the transport layer.
    #[error("{op}: request failed: {source}")]
    Network {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{op}: HTTP {status}: {body}")]
    Http {
        op: &'static str,
        status: StatusCode,
        body: String,
    },

    /// The selected file does not match the persisted session identity.
    #[error(
        "file does not match session: expected {expected_name} ({expected_size} bytes), \
         got {actual_name} ({actual_size} bytes); start a new upload"
    )]
    SessionMismatch {
        expected_name: String,
        expected_size: u64,
        actual_name: String,
        actual_size: u64,
    },

    /// No persisted session exists for the requested upload id.
    #[error("no resumable session for upload {upload_id}; start a new upload")]
    SessionMissing { upload_id: String },

    /// The session carries no video id to report completion against.
    #[error("upload {upload_id} has no video id; completion cannot be reported")]
    MissingVideoId { upload_id: String },

    /// A batch was started with no video files.
    #[error("batch contains no video files")]
    EmptyBatch,

    /// The path has no usable file name.
    #[error("invalid file path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("session store: {0}")]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload worker failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl UploadError {
    /// Whether the retry policy may repeat the failed operation.
    ///
    /// True only for network-layer failures that never produced an HTTP
    /// response: refused connections, timeouts, and requests that died
    /// mid-transport. A 4xx/5xx response is never retryable here.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network { source, .. } => {
                source.status().is_none()
                    && (source.is_connect() || source.is_timeout() || source.is_request())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_are_not_retryable() {
        let err = UploadError::Http {
            op: "commit_block_list",
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "backend busy".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn identity_and_metadata_failures_are_fatal() {
        let mismatch = UploadError::SessionMismatch {
            expected_name: "session.mp4".to_string(),
            expected_size: 10,
            actual_name: "session.mp4".to_string(),
            actual_size: 11,
        };
        assert!(!mismatch.is_retryable());

        let missing = UploadError::SessionMissing {
            upload_id: "up-1".to_string(),
        };
        assert!(!missing.is_retryable());
    }
}
