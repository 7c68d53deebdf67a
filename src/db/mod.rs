//! Durable local storage for upload sessions.

pub mod sessions;

pub use sessions::{
    SessionStore, UploadSession, UploadedBlock, DEFAULT_SESSION_MAX_AGE_DAYS,
};

// Custom error type for database operations
pub type DbResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
