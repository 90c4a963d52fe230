//! Error types for timeharbor-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using timeharbor-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Local persistence failures.
///
/// A mutation that returns one of these is not durable.
#[derive(Error, Debug)]
pub enum StorageError {
    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema could not be created or upgraded
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Errors that can occur in timeharbor-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Durable store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote data service call failed
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Connectivity was lost or is unavailable
    #[error("Network is offline")]
    Offline,

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timer operations require an open clock-in
    #[error("Not clocked in")]
    NotClockedIn,

    /// Operation needs a signed-in user
    #[error("No active session")]
    NoSession,
}

impl Error {
    /// Returns whether this error came from local persistence.
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<libsql::Error> for Error {
    fn from(error: libsql::Error) -> Self {
        Self::Storage(StorageError::LibSql(error))
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(error))
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(StorageError::Io(error))
    }
}
