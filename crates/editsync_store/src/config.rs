//! Store configuration.

use crate::session::UserIdentity;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default database file name.
pub const DEFAULT_DB_FILE_NAME: &str = "editsync.db";

/// Configuration for the local database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory under which every user gets a sub-directory.
    pub root_dir: PathBuf,

    /// Database file name inside the user's directory.
    pub db_file_name: String,

    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl StoreConfig {
    /// Creates a configuration rooted at `root_dir`.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the database file name.
    #[must_use]
    pub fn with_db_file_name(mut self, name: impl Into<String>) -> Self {
        self.db_file_name = name.into();
        self
    }

    /// Sets the busy timeout.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Returns the directory holding the given user's files.
    pub fn user_dir(&self, user: &UserIdentity) -> PathBuf {
        self.root_dir.join(sanitize(user.username()))
    }

    /// Returns the database location for the given user.
    ///
    /// Every user gets an isolated file.
    pub fn database_path(&self, user: &UserIdentity) -> PathBuf {
        self.user_dir(user).join(&self.db_file_name)
    }

    /// Returns the root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

/// Bytes that may appear unescaped in a user directory name.
///
/// `_` and `%` stay escaped so distinct names never share a directory.
const USER_DIR: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.');

fn sanitize(name: &str) -> String {
    match name {
        // A lone `%` never results from encoding, so it cannot collide.
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => utf8_percent_encode(name, USER_DIR).to_string(),
    }
}
