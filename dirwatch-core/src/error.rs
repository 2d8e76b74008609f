use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the census engine.
///
/// Scan-level failures (`Scan`) abort a full cycle; file-level failures
/// (`Read`) are scoped to one file and must not abort the surrounding batch.
#[derive(Error, Debug)]
pub enum CensusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("scan of {root} failed: {message}")]
    Scan { root: PathBuf, message: String },

    #[error("read of {path} failed: {message}")]
    Read { path: PathBuf, message: String },

    #[error("watch initialization failed: {0}")]
    WatchInit(String),

    #[error("control channel error: {0}")]
    Channel(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CensusError>;
