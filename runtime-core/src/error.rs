//! Error types for dbmeter-core

use thiserror::Error;

/// Result type alias for dbmeter-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dbmeter-core
#[derive(Debug, Error)]
pub enum Error {
    /// Extractor or pipeline configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Frame buffer does not match its declared dimensions/format
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Image conversion or encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Text-recognition engine failure
    #[error("Recognition failed: {0}")]
    Recognition(String),

    /// Upstream frame source failed permanently
    #[error("Frame source failed: {0}")]
    Source(String),

    /// Pipeline execution error
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Number pattern compilation error
    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}
