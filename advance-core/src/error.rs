use std::path::PathBuf;
use thiserror::Error;

/// Typed failures callers may want to match on.
///
/// Everything else travels as `anyhow::Error` with context attached.
#[derive(Debug, Error)]
pub enum AdvanceError {
    /// Another process holds the lock on a data file
    #[error("File is locked by another user/process: {0:?}")]
    FileLocked(PathBuf),

    #[error("File not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },
}
