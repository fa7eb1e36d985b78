use thiserror::Error;

/// Errors shared across the core crate: path normalization and settings parsing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("path does not exist: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("setting {key} out of bounds: {value}")]
    SettingOutOfBounds { key: String, value: String },
}
