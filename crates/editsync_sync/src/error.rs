//! Error types for the sync layer.

use editsync_protocol::CodecError;
use editsync_store::StoreError;
use std::io;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("server returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Encoding or decoding a wire entity failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server did not hand out an upload URL.
    #[error("no upload URL received for {method}")]
    MissingUploadUrl {
        /// Method that needed the upload.
        method: &'static str,
    },

    /// The server rejected a call because the user is not logged in.
    #[error("server reports user not logged in")]
    NotLoggedIn,

    /// A response handler failed.
    #[error("response handler failed: {0}")]
    Handler(String),

    /// A worker thread panicked.
    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Returns true if the caller may simply try again later.
    ///
    /// Network failures leave local state unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_)
                | SyncError::Status { .. }
                | SyncError::MissingUploadUrl { .. }
                | SyncError::NotLoggedIn
        )
    }

    /// Returns true if the error leaves no usable local state.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Store(e) => e.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors() {
        assert!(SyncError::transport("connection refused").is_recoverable());
        assert!(SyncError::Status { status: 500 }.is_recoverable());
        assert!(!SyncError::handler("bad state").is_recoverable());
        assert!(!SyncError::WorkerPanicked.is_recoverable());
    }

    #[test]
    fn fatal_errors() {
        assert!(SyncError::from(StoreError::migration_failed("x")).is_fatal());
        assert!(!SyncError::from(StoreError::NotConnected).is_fatal());
        assert!(!SyncError::transport("x").is_fatal());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SyncError::Status { status: 503 }.to_string(),
            "server returned HTTP 503"
        );
        let err = SyncError::MissingUploadUrl { method: "publish" };
        assert!(err.to_string().contains("publish"));
    }
}
