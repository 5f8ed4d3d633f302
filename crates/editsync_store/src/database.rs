//! The shared database connection.

use crate::config::StoreConfig;
use crate::cursor::Cursor;
use crate::error::{StoreError, StoreResult};
use crate::migration::{MigrationReport, Migrator};
use crate::session::{SessionListener, UserIdentity};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No database is open.
    Disconnected,
    /// The database file is being opened and migrated.
    Connecting,
    /// The database is open and its schema is current.
    Connected,
}

struct DatabaseInner {
    connection: Option<Connection>,
    state: ConnectionState,
    user: Option<UserIdentity>,
    path: Option<PathBuf>,
    last_migration: Option<MigrationReport>,
}

/// The local database of the logged-in user.
///
/// One `Database` is shared by every gateway in the process through an
/// `Arc`. Its connection is opened on login and closed on logout; register
/// it with a [`Session`](crate::Session) to wire that up.
pub struct Database {
    config: StoreConfig,
    migrator: Migrator,
    inner: Mutex<DatabaseInner>,
}

impl Database {
    /// Creates a disconnected database for the built-in schema.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_migrator(config, Migrator::new())
    }

    /// Creates a disconnected database with a custom migrator.
    pub fn with_migrator(config: StoreConfig, migrator: Migrator) -> Self {
        Self {
            config,
            migrator,
            inner: Mutex::new(DatabaseInner {
                connection: None,
                state: ConnectionState::Disconnected,
                user: None,
                path: None,
                last_migration: None,
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens the database of `user` and brings its schema up to date.
    ///
    /// Connecting again as the same user is a no-op. Connecting as another
    /// user closes the current connection first. Any failure leaves the
    /// database disconnected and is fatal for the caller.
    pub fn connect(&self, user: &UserIdentity) -> StoreResult<()> {
        let mut inner = self.inner.lock();

        if inner.state == ConnectionState::Connected {
            if inner.user.as_ref() == Some(user) {
                return Ok(());
            }
            close(&mut inner);
        }

        inner.state = ConnectionState::Connecting;
        let path = self.config.database_path(user);

        match self.open(&path) {
            Ok((connection, report)) => {
                tracing::info!(
                    path = %path.display(),
                    created = report.created.len(),
                    upgraded = report.upgraded.len(),
                    "database connected"
                );
                inner.connection = Some(connection);
                inner.state = ConnectionState::Connected;
                inner.user = Some(user.clone());
                inner.path = Some(path);
                inner.last_migration = Some(report);
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to connect database");
                inner.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn open(&self, path: &Path) -> StoreResult<(Connection, MigrationReport)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::open(path, e.to_string()))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let mut connection =
            Connection::open_with_flags(path, flags).map_err(|e| StoreError::open(path, e.to_string()))?;
        connection
            .busy_timeout(self.config.busy_timeout)
            .map_err(|e| StoreError::open(path, e.to_string()))?;

        let report = self.migrator.run(&mut connection)?;
        Ok((connection, report))
    }

    /// Closes the connection. Disconnecting twice is a no-op.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Disconnected {
            close(&mut inner);
        }
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns true while connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the location of the open database file.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    /// Returns the report of the migration run by the last connect.
    pub fn last_migration(&self) -> Option<MigrationReport> {
        self.inner.lock().last_migration.clone()
    }

    /// Runs `f` with the open connection.
    pub fn with_connection<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut inner = self.inner.lock();
        let connection = inner.connection.as_mut().ok_or(StoreError::NotConnected)?;
        f(connection)
    }

    /// Executes one or more statements.
    pub fn execute(&self, sql: &str) -> StoreResult<()> {
        self.with_connection(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Runs a query, replacing the content of `cursor` with its rows.
    ///
    /// Statements that would write are rejected with
    /// [`StoreError::NotReadOnly`]; writes go through [`Database::execute`]
    /// or a gateway.
    pub fn query_into(&self, cursor: &mut Cursor, sql: &str) -> StoreResult<()> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            if !stmt.readonly() {
                return Err(StoreError::NotReadOnly {
                    sql: sql.to_string(),
                });
            }
            cursor.fill(&mut stmt)
        })
    }

    /// Deletes every row of every managed table.
    pub fn clear_tables(&self) -> StoreResult<()> {
        let migrator = self.migrator;
        self.with_connection(|conn| migrator.clear_tables(conn))
    }
}

fn close(inner: &mut DatabaseInner) {
    if let Some(connection) = inner.connection.take() {
        if let Err((_, e)) = connection.close() {
            tracing::warn!(error = %e, "error while closing database");
        }
    }
    if let Some(path) = inner.path.take() {
        tracing::info!(path = %path.display(), "database disconnected");
    }
    inner.user = None;
    inner.state = ConnectionState::Disconnected;
}

impl SessionListener for Database {
    fn on_login(&self, user: &UserIdentity) -> StoreResult<()> {
        self.connect(user)
    }

    fn on_logout(&self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("path", &inner.path)
            .finish()
    }
}
