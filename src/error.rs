use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rotalog
#[derive(Debug, Error)]
pub enum RotalogError {
    // Construction errors
    #[error("Invalid log path: {0}")]
    InvalidPath(String),

    #[error("Directory {} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    // File lifecycle errors
    #[error("Failed to open log file: {0}")]
    OpenFailed(String),

    #[error("Failed to retarget symlink: {0}")]
    SymlinkFailed(String),

    #[error("Log file is not open: {0}")]
    NotOpen(String),

    #[error("Write failed after {written} bytes: {source}")]
    WriteFailed {
        written: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RotalogError {
    /// Bytes that reached the file before the failure, for write errors
    pub fn bytes_written(&self) -> Option<usize> {
        match self {
            RotalogError::WriteFailed { written, .. } => Some(*written),
            _ => None,
        }
    }
}

/// Result type alias for rotalog operations
pub type Result<T> = std::result::Result<T, RotalogError>;
