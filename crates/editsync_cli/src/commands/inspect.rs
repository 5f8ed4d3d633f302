//! Inspect command implementation.

use editsync_store::{
    schema, Cursor, Database, ResourceRevisionStore, SqliteGateway, StoreConfig, UserIdentity,
};
use serde::Serialize;
use std::sync::Arc;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Schema version the tool expects.
    pub schema_version: i64,
    /// Per-table statistics.
    pub tables: Vec<TableStats>,
    /// Resources with revisions not yet uploaded (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<Vec<PendingResource>>,
    /// Resources removed locally since the last sync (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<String>>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Version recorded in the `version` table.
    pub version: i64,
    /// Number of rows.
    pub row_count: i64,
}

/// A resource waiting for upload.
#[derive(Debug, Serialize)]
pub struct PendingResource {
    /// Resource id.
    pub id: String,
    /// Resource type.
    pub resource_type: i32,
    /// Revision numbers not yet uploaded.
    pub revisions: Vec<i64>,
}

/// Runs the inspect command.
pub fn run(
    config: StoreConfig,
    user: &UserIdentity,
    show_pending: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.database_path(user);
    if !path.exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }

    let database = Arc::new(Database::new(config));
    database.connect(user)?;
    let result = inspect(&database, show_pending)?;
    database.disconnect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn inspect(
    database: &Arc<Database>,
    show_pending: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut cursor = Cursor::new();
    database.query_into(
        &mut cursor,
        "SELECT table_name, version FROM version ORDER BY table_name",
    )?;
    let mut versions = Vec::with_capacity(cursor.row_count());
    while cursor.next() {
        if let Some(name) = cursor.get_string(0)? {
            versions.push((name, cursor.get_i64(1)?));
        }
    }

    let mut tables = Vec::with_capacity(versions.len());
    for (name, version) in versions {
        // Rows for tables this build does not manage are reported without counting.
        let row_count = if schema::table(&name).is_some() {
            database.query_into(&mut cursor, &format!("SELECT COUNT(*) FROM {name}"))?;
            if cursor.next() {
                cursor.get_i64(0)?
            } else {
                0
            }
        } else {
            -1
        };
        tables.push(TableStats {
            name,
            version,
            row_count,
        });
    }

    let (pending, removed) = if show_pending {
        let store = ResourceRevisionStore::new(SqliteGateway::new(Arc::clone(database)));
        let pending = store
            .unsynced_revisions()?
            .into_iter()
            .map(|entity| PendingResource {
                id: entity.resource_id.to_string(),
                resource_type: entity.resource_type,
                revisions: entity.revisions.iter().map(|r| r.revision).collect(),
            })
            .collect();
        let removed = store
            .removed_resources()?
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        (Some(pending), Some(removed))
    } else {
        (None, None)
    };

    Ok(InspectResult {
        path: database
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        schema_version: schema::SCHEMA_VERSION,
        tables,
        pending,
        removed,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("editsync Database Inspection");
    println!("============================");
    println!("Path: {}", result.path);
    println!("Schema version: {}", result.schema_version);
    println!();
    println!("Tables:");
    for table in &result.tables {
        if table.row_count < 0 {
            println!("  {:<20} v{:<3} (unmanaged)", table.name, table.version);
        } else {
            println!(
                "  {:<20} v{:<3} {} rows",
                table.name, table.version, table.row_count
            );
        }
    }

    if let Some(pending) = &result.pending {
        println!();
        println!("Pending uploads: {}", pending.len());
        for resource in pending {
            println!(
                "  {} (type {}): revisions {:?}",
                resource.id, resource.resource_type, resource.revisions
            );
        }
    }
    if let Some(removed) = &result.removed {
        println!();
        println!("Removed since last sync: {}", removed.len());
        for id in removed {
            println!("  {id}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[test]
    fn reports_every_managed_table() {
        let dir = TempDir::new().unwrap();
        let user = UserIdentity::new("tester");
        let database = Arc::new(Database::new(StoreConfig::new(dir.path())));
        database.connect(&user).unwrap();

        let store = ResourceRevisionStore::new(SqliteGateway::new(Arc::clone(&database)));
        let id = Uuid::new_v4();
        store.add(id, 2).unwrap();
        store.add_revision(id, 1, 10).unwrap();

        let result = inspect(&database, true).unwrap();

        assert_eq!(result.tables.len(), schema::TABLES.len());
        assert!(result
            .tables
            .iter()
            .all(|t| t.version == schema::SCHEMA_VERSION));
        let revisions = result
            .tables
            .iter()
            .find(|t| t.name == "resource_revision")
            .unwrap();
        assert_eq!(revisions.row_count, 1);

        let pending = result.pending.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].revisions, vec![1]);
        assert!(result.removed.unwrap().is_empty());
    }

    #[test]
    fn missing_database_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = run(
            StoreConfig::new(dir.path()),
            &UserIdentity::new("nobody"),
            false,
            "text",
        );
        assert!(result.is_err());
    }
}
