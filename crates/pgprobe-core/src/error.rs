//! Error types for pgprobe

use thiserror::Error;

/// Core error type for probe operations
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;
