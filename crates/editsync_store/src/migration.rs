//! Schema migration.
//!
//! Every managed table carries its own version number in the `version`
//! table. On connect the [`Migrator`] compares those numbers against the
//! target version and brings the database up to date:
//!
//! - tables absent from the `version` table are created
//! - tables with an older version receive the additive migrations they miss
//! - nothing is ever dropped or renamed
//!
//! The whole run happens inside one SQLite transaction. A failing statement
//! rolls everything back and surfaces as [`StoreError::MigrationFailed`].
//!
//! ## Usage
//!
//! ```
//! use editsync_store::migration::Migrator;
//! use rusqlite::Connection;
//!
//! let mut conn = Connection::open_in_memory().unwrap();
//! let report = Migrator::new().run(&mut conn).unwrap();
//! assert_eq!(report.created.len(), editsync_store::schema::TABLES.len());
//!
//! // Running again changes nothing.
//! assert!(Migrator::new().run(&mut conn).unwrap().is_noop());
//! ```

use crate::error::{StoreError, StoreResult};
use crate::schema::{self, SCHEMA_VERSION, VERSION_TABLE};
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;

/// An additive change bringing a table to `version`.
#[derive(Debug, Clone, Copy)]
pub struct TableMigration {
    /// Version the table has once the statements ran.
    pub version: i64,
    /// Statements to execute, in order.
    pub statements: &'static [&'static str],
}

/// A managed table.
#[derive(Debug, Clone, Copy)]
pub struct TableDefinition {
    /// Table name.
    pub name: &'static str,
    /// `CREATE TABLE IF NOT EXISTS` statement producing the current schema.
    pub create_sql: &'static str,
    /// Migrations ordered by version.
    pub migrations: &'static [TableMigration],
}

impl TableDefinition {
    /// Returns the migrations needed to bring a table at `from` up to `to`.
    pub fn pending_migrations(&self, from: i64, to: i64) -> impl Iterator<Item = &TableMigration> {
        self.migrations
            .iter()
            .filter(move |m| m.version > from && m.version <= to)
    }
}

/// An upgraded table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableUpgrade {
    /// Table name.
    pub table: String,
    /// Version found in the database.
    pub from_version: i64,
    /// Number of statements executed.
    pub statements_applied: usize,
}

/// Summary of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Tables that were created.
    pub created: Vec<String>,
    /// Tables that were upgraded from an older version.
    pub upgraded: Vec<TableUpgrade>,
    /// Version every table is at after the run.
    pub target_version: i64,
}

impl MigrationReport {
    /// Returns true if the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.upgraded.is_empty()
    }
}

/// Brings the managed tables up to the target schema version.
#[derive(Debug, Clone, Copy)]
pub struct Migrator {
    tables: &'static [TableDefinition],
    target_version: i64,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    /// Creates a migrator for the built-in schema.
    pub fn new() -> Self {
        Self::with_tables(schema::TABLES, SCHEMA_VERSION)
    }

    /// Creates a migrator for a custom set of tables.
    pub fn with_tables(tables: &'static [TableDefinition], target_version: i64) -> Self {
        Self {
            tables,
            target_version,
        }
    }

    /// Returns the target version.
    pub fn target_version(&self) -> i64 {
        self.target_version
    }

    /// Runs the migration inside a single transaction.
    pub fn run(&self, conn: &mut Connection) -> StoreResult<MigrationReport> {
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::migration_failed(format!("begin transaction: {e}")))?;

        let report = self.run_in(&tx)?;

        tx.commit()
            .map_err(|e| StoreError::migration_failed(format!("commit: {e}")))?;

        for table in &report.created {
            tracing::info!(table = %table, version = report.target_version, "created table");
        }
        for upgrade in &report.upgraded {
            tracing::info!(
                table = %upgrade.table,
                from = upgrade.from_version,
                to = report.target_version,
                statements = upgrade.statements_applied,
                "upgraded table"
            );
        }
        Ok(report)
    }

    fn run_in(&self, tx: &Transaction<'_>) -> StoreResult<MigrationReport> {
        let mut report = MigrationReport {
            target_version: self.target_version,
            ..MigrationReport::default()
        };

        exec(
            tx,
            VERSION_TABLE,
            "CREATE TABLE IF NOT EXISTS version (version INTEGER, table_name TEXT)",
        )?;

        let stored = read_versions(tx)?;

        let mut needs_update = false;
        for (table_name, version) in &stored {
            if *version >= self.target_version {
                continue;
            }
            needs_update = true;

            // Rows for tables this build does not manage only get their version bumped.
            let Some(table) = self.tables.iter().find(|t| t.name == table_name.as_str()) else {
                tracing::debug!(table = %table_name, "ignoring unmanaged table");
                continue;
            };

            let mut applied = 0;
            for migration in table.pending_migrations(*version, self.target_version) {
                for statement in migration.statements {
                    exec(tx, table.name, statement)?;
                    applied += 1;
                }
            }
            report.upgraded.push(TableUpgrade {
                table: table.name.to_string(),
                from_version: *version,
                statements_applied: applied,
            });
        }

        if needs_update {
            tx.execute("UPDATE version SET version = ?1", params![self.target_version])
                .map_err(|e| StoreError::migration_failed(format!("{VERSION_TABLE}: {e}")))?;
        }

        for table in self.tables {
            if stored.contains_key(table.name) {
                continue;
            }
            exec(tx, table.name, table.create_sql)?;
            tx.execute(
                "INSERT INTO version (version, table_name) VALUES (?1, ?2)",
                params![self.target_version, table.name],
            )
            .map_err(|e| StoreError::migration_failed(format!("{VERSION_TABLE}: {e}")))?;
            report.created.push(table.name.to_string());
        }

        Ok(report)
    }

    /// Deletes every row of every managed table.
    ///
    /// The `version` table is left untouched so the schema stays current.
    pub fn clear_tables(&self, conn: &mut Connection) -> StoreResult<()> {
        let tx = conn.transaction()?;
        for table in self.tables {
            tx.execute_batch(&format!("DELETE FROM {}", table.name))?;
        }
        tx.commit()?;
        tracing::info!(tables = self.tables.len(), "cleared tables");
        Ok(())
    }
}

fn exec(tx: &Transaction<'_>, table: &str, statement: &str) -> StoreResult<()> {
    tx.execute_batch(statement)
        .map_err(|e| StoreError::migration_failed(format!("{table}: {statement}: {e}")))
}

fn read_versions(tx: &Transaction<'_>) -> StoreResult<HashMap<String, i64>> {
    let read = || -> rusqlite::Result<HashMap<String, i64>> {
        let mut stmt = tx.prepare("SELECT version, table_name FROM version")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, Option<i64>>(0)?))
        })?;

        let mut versions = HashMap::new();
        for row in rows {
            let (name, version) = row?;
            versions.insert(name, version.unwrap_or(0));
        }
        Ok(versions)
    };
    read().map_err(|e| StoreError::migration_failed(format!("{VERSION_TABLE}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        names
    }

    fn version_of(conn: &Connection, table: &str) -> Option<i64> {
        conn.query_row(
            "SELECT version FROM version WHERE table_name = ?1",
            [table],
            |row| row.get(0),
        )
        .ok()
    }

    #[test]
    fn fresh_database_gets_every_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        let report = Migrator::new().run(&mut conn).unwrap();

        assert_eq!(report.created.len(), schema::TABLES.len());
        assert!(report.upgraded.is_empty());
        for table in schema::TABLES {
            assert_eq!(version_of(&conn, table.name), Some(SCHEMA_VERSION));
        }
        assert!(columns(&conn, "level_stat").contains(&"deaths_to_sync".to_string()));
    }

    #[test]
    fn second_run_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        Migrator::new().run(&mut conn).unwrap();
        let report = Migrator::new().run(&mut conn).unwrap();

        assert!(report.is_noop());
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, schema::TABLES.len() as i64);
    }

    #[test]
    fn old_table_gains_columns_without_data_loss() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE version (version INTEGER, table_name TEXT);
             INSERT INTO version VALUES (5, 'level_stat');
             CREATE TABLE level_stat (
                uuid TEXT PRIMARY KEY, bookmark INTEGER DEFAULT 0,
                play_count INTEGER DEFAULT 0, plays_to_sync INTEGER DEFAULT 0,
                clear_count INTEGER DEFAULT 0, clears_to_sync INTEGER DEFAULT 0,
                rating INTEGER DEFAULT 0, last_played INTEGER, synced INTEGER DEFAULT 0);
             INSERT INTO level_stat (uuid, play_count, rating) VALUES ('lvl-1', 7, 4);",
        )
        .unwrap();

        let report = Migrator::new().run(&mut conn).unwrap();

        assert_eq!(
            report.upgraded,
            vec![TableUpgrade {
                table: "level_stat".into(),
                from_version: 5,
                statements_applied: 3,
            }]
        );
        assert_eq!(report.created.len(), schema::TABLES.len() - 1);

        let cols = columns(&conn, "level_stat");
        for added in ["comment", "death_count", "deaths_to_sync"] {
            assert_eq!(cols.iter().filter(|c| *c == added).count(), 1, "{added}");
        }

        let (plays, rating, comment, deaths): (i64, i64, String, i64) = conn
            .query_row(
                "SELECT play_count, rating, comment, death_count FROM level_stat WHERE uuid = 'lvl-1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!((plays, rating, comment.as_str(), deaths), (7, 4, "", 0));
        assert_eq!(version_of(&conn, "level_stat"), Some(SCHEMA_VERSION));
    }

    #[test]
    fn analytics_event_type_is_backfilled() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE version (version INTEGER, table_name TEXT);
             INSERT INTO version VALUES (7, 'analytics_event');
             CREATE TABLE analytics_event (scene_id TEXT, time INTEGER, name TEXT, data TEXT);
             INSERT INTO analytics_event VALUES ('scene', 10, 'jump', '{}');",
        )
        .unwrap();

        Migrator::new().run(&mut conn).unwrap();

        let kind: i64 = conn
            .query_row("SELECT type FROM analytics_event", [], |r| r.get(0))
            .unwrap();
        assert_eq!(kind, 0);
    }

    #[test]
    fn unmanaged_rows_only_get_version_bumped() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE version (version INTEGER, table_name TEXT);
             INSERT INTO version VALUES (3, 'legacy_table');",
        )
        .unwrap();

        let report = Migrator::new().run(&mut conn).unwrap();
        assert!(report.upgraded.is_empty());
        assert_eq!(version_of(&conn, "legacy_table"), Some(SCHEMA_VERSION));
    }

    #[test]
    fn failing_statement_rolls_back() {
        static BROKEN: &[TableDefinition] = &[TableDefinition {
            name: "broken",
            create_sql: "CREATE TABLE IF NOT EXISTS broken (id INTEGER)",
            migrations: &[TableMigration {
                version: 2,
                statements: &[
                    "ALTER TABLE broken ADD COLUMN note TEXT DEFAULT ''",
                    "ALTER TABLE missing_table ADD COLUMN x INTEGER",
                ],
            }],
        }];

        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE version (version INTEGER, table_name TEXT);
             INSERT INTO version VALUES (1, 'broken');
             CREATE TABLE broken (id INTEGER);
             INSERT INTO broken VALUES (42);",
        )
        .unwrap();

        let err = Migrator::with_tables(BROKEN, 2).run(&mut conn).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("broken"));

        assert_eq!(columns(&conn, "broken"), vec!["id".to_string()]);
        assert_eq!(version_of(&conn, "broken"), Some(1));
        let id: i64 = conn.query_row("SELECT id FROM broken", [], |r| r.get(0)).unwrap();
        assert_eq!(id, 42);
    }

    #[test]
    fn clear_tables_keeps_versions() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new();
        migrator.run(&mut conn).unwrap();
        conn.execute_batch("INSERT INTO resource_removed VALUES ('a'); INSERT INTO highscore (level_id, score) VALUES ('l', 3);")
            .unwrap();

        migrator.clear_tables(&mut conn).unwrap();

        let removed: i64 = conn
            .query_row("SELECT COUNT(*) FROM resource_removed", [], |r| r.get(0))
            .unwrap();
        let scores: i64 = conn
            .query_row("SELECT COUNT(*) FROM highscore", [], |r| r.get(0))
            .unwrap();
        assert_eq!((removed, scores), (0, 0));
        assert_eq!(version_of(&conn, "highscore"), Some(SCHEMA_VERSION));
    }
}
