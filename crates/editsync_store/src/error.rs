//! Error types for the local store.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The database file could not be opened or created.
    #[error("cannot open database {path:?}: {message}")]
    Open {
        /// Location of the database file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A schema migration statement failed. The migration was rolled back.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },

    /// The database is not connected (no user logged in).
    #[error("database not connected")]
    NotConnected,

    /// A resource is not present in the local store.
    #[error("resource not found: {id}")]
    ResourceNotFound {
        /// The resource id that was not found.
        id: Uuid,
    },

    /// A statement passed as a query would modify the database.
    #[error("statement is not read-only: {sql}")]
    NotReadOnly {
        /// The rejected statement.
        sql: String,
    },

    /// Stored data did not have the expected shape.
    #[error("invalid stored data: {message}")]
    InvalidData {
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Creates an open error.
    pub fn open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Returns true if no durable state is reachable after this error.
    ///
    /// Fatal errors abort startup: the database cannot be opened or its
    /// schema cannot be brought up to date.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Open { .. } | StoreError::MigrationFailed { .. })
    }
}
