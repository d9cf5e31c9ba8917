//! Error types for beaconcheck

use thiserror::Error;

/// Result type alias using the beaconcheck Error
pub type Result<T> = std::result::Result<T, Error>;

/// beaconcheck error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Expectation source is missing required column '{0}'")]
    MissingColumn(String),

    #[error("Invalid network pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Row {row} does not exist in the expectation source ({len} rows)")]
    RowOutOfRange { row: usize, len: usize },

    #[error("Failed to persist {path}: {reason}")]
    Persist { path: String, reason: String },
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(e: tempfile::PersistError) -> Self {
        Error::Persist {
            path: e.file.path().display().to_string(),
            reason: e.error.to_string(),
        }
    }
}
