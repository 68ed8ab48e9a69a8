//! Error types for clipdeck

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipdeckError {
    #[error("Clip not found: {0}")]
    ClipNotFound(u64),
    #[error("Clip {0} already exists")]
    DuplicateClip(u64),
    #[error("Buffer not found: {0}")]
    BufferNotFound(String),
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),
}

pub type Result<T> = std::result::Result<T, ClipdeckError>;
