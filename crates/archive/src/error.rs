use thiserror::Error;

/// Failure modes for the archive reader, mapped by the HTTP layer to the
/// status codes the error-handling design assigns them.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive not found: {0}")]
    NotFound(String),

    #[error("unsupported archive extension: {0}")]
    Unsupported(String),

    #[error("archive corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("entry not found at index {0}")]
    EntryNotFound(usize),

    #[error("failed to read entry: {0}")]
    ReadFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
