use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("catalog request failed: {0}")]
    Catalog(#[from] reqwest::Error),

    #[error("work not found in catalog: {0}")]
    CatalogMiss(String),

    #[error("no work code found in path: {0}")]
    NoWorkCode(PathBuf),

    #[error("archive tool failed: {0}")]
    ArchiveTool(String),

    #[error("extraction failed: no valid password")]
    PasswordExhausted,

    #[error("volume set incomplete or wait timed out")]
    VolumeIncomplete,

    #[error("extraction verification failed: output incomplete")]
    IntegrityFailure,

    #[error("timed out waiting for file to stabilise: {0}")]
    StabilityTimeout(PathBuf),

    #[error("user cancel")]
    Cancelled,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("conflict record not found: {0}")]
    ConflictNotFound(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
