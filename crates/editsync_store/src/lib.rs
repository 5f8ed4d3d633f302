//! # editsync store
//!
//! Local SQLite persistence for the editor, bound to the user session.
//!
//! This crate provides:
//! - [`Session`] and [`SessionListener`] for login/logout signals
//! - [`Database`], the per-user connection opened on login
//! - [`Migrator`], which brings every managed table up to the current
//!   schema version without losing data
//! - [`SqliteGateway`], statement execution with an optional retry queue
//! - [`ResourceRevisionStore`], revision bookkeeping for synchronized
//!   resources
//!
//! ## Example
//!
//! ```no_run
//! use editsync_store::{Database, Session, SqliteGateway, StoreConfig, UserIdentity};
//! use std::sync::Arc;
//!
//! let database = Arc::new(Database::new(StoreConfig::new("/var/lib/editsync")));
//! let session = Session::new();
//! session.subscribe(&database)?;
//!
//! session.login(UserIdentity::new("alice"))?;
//! let gateway = SqliteGateway::new(Arc::clone(&database));
//! gateway.exec_sql("INSERT INTO highscore (level_id, score) VALUES ('intro', 1200)")?;
//! # Ok::<(), editsync_store::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod database;
mod error;
mod gateway;
pub mod migration;
mod resource;
pub mod schema;
mod session;

pub use config::{StoreConfig, DEFAULT_DB_FILE_NAME};
pub use cursor::Cursor;
pub use database::{ConnectionState, Database};
pub use error::{StoreError, StoreResult};
pub use gateway::{ExecOutcome, GatewayMode, SqliteGateway};
pub use migration::{MigrationReport, Migrator, TableUpgrade};
pub use resource::ResourceRevisionStore;
pub use session::{Session, SessionListener, UserIdentity};
