//! Error types for spendlake

use thiserror::Error;

/// Result type alias for spendlake operations
pub type Result<T> = std::result::Result<T, SpendlakeError>;

/// Main error type for spendlake
///
/// A rejected (delta) archive during discovery is deliberately absent here:
/// it ends the year walk normally and is modelled as a discovery outcome.
#[derive(Error, Debug)]
pub enum SpendlakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network or service failure while discovering or downloading archives
    #[error("Transport error: {0}")]
    Transport(String),

    /// Extraction failure or an archive name without a leading year
    #[error("Archive format error: {0}")]
    ArchiveFormat(String),

    /// A FLOAT or INTEGER field whose text does not parse
    #[error("Conversion error on line {line}: field '{field}' value {value:?} is not a valid {expected}")]
    Conversion {
        line: usize,
        field: String,
        value: String,
        expected: String,
    },

    /// Malformed delimited input
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Upload could not be confirmed; local files were kept
    #[error("Unverified upload: {0}")]
    UnverifiedUpload(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SpendlakeError {
    /// Whether the error came from the network rather than from local data
    pub fn is_transport(&self) -> bool {
        matches!(self, SpendlakeError::Transport(_))
    }
}
