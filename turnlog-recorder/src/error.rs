use thiserror::Error;

/// Errors from the recorder's fallible plumbing (stores, config files,
/// channels). Extraction and observation never surface errors.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Save error: {0}")]
    SaveError(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
