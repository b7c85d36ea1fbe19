//! Error types for japp-pack

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pack operations
pub type PackResult<T> = Result<T, PackError>;

/// Errors that can occur during packing and launching
#[derive(Error, Debug)]
pub enum PackError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid manifest file
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Jar (zip) reading error
    #[error("Jar error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Container format error
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// Input path not found
    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),

    /// Input exists but cannot be packed
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Malformed module-info.class
    #[error("Invalid class file: {0}")]
    InvalidClassFile(String),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Resource content does not match its recorded checksum
    #[error("Checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Resource not present in the container
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Condition expression error
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Launch error (java not found, boot module missing, ...)
    #[error("Launch error: {0}")]
    Launch(String),
}
