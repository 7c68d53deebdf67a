//! Resumable block-upload client for livestream VOD ingestion.
//!
//! Files are split into fixed 4 MiB blocks with deterministic ids, staged
//! concurrently against a pre-signed blob endpoint, and tracked in a local
//! durable store so interrupted uploads resume without re-sending blocks
//! that already made it. Committing the ordered block list assembles the
//! final blob; only then is the local session dropped and the backend told
//! the upload finished.

pub mod api;
pub mod blob;
pub mod db;
pub mod error;
pub mod retry;
pub mod upload;

pub use api::{ApiClient, ResumeCheckResponse};
pub use db::{SessionStore, UploadSession};
pub use error::UploadError;
pub use upload::batch::{BatchFiles, BatchOutcome};
pub use upload::types::{
    BatchProgressCallback, ProgressCallback, UploadOptions, UploadProgress,
};
pub use upload::{UploadOutcome, Uploader};
