//! Migrate command implementation.

use editsync_store::{Database, MigrationReport, StoreConfig, UserIdentity};
use tracing::info;

/// Opens the user's database, which creates missing tables and upgrades
/// outdated ones, and prints what changed.
pub fn run(config: StoreConfig, user: &UserIdentity) -> Result<(), Box<dyn std::error::Error>> {
    info!(user = user.username(), "migrating database");

    let report = migrate(config, user)?;
    print_report(&report);
    Ok(())
}

fn migrate(
    config: StoreConfig,
    user: &UserIdentity,
) -> Result<MigrationReport, Box<dyn std::error::Error>> {
    let database = Database::new(config);
    database.connect(user)?;
    let report = database
        .last_migration()
        .ok_or("connect finished without a migration report")?;
    database.disconnect();
    Ok(report)
}

fn print_report(report: &MigrationReport) {
    println!("Migration Report");
    println!("================");
    println!("  Target version: {}", report.target_version);

    if report.is_noop() {
        println!("  Database is up to date.");
        return;
    }

    if !report.created.is_empty() {
        println!("\nCreated tables:");
        for table in &report.created {
            println!("  {table}");
        }
    }
    if !report.upgraded.is_empty() {
        println!("\nUpgraded tables:");
        for upgrade in &report.upgraded {
            println!(
                "  {}: v{} -> v{} ({} statements)",
                upgrade.table, upgrade.from_version, report.target_version, upgrade.statements_applied
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use editsync_store::schema;
    use tempfile::TempDir;

    #[test]
    fn second_run_is_noop() {
        let dir = TempDir::new().unwrap();
        let user = UserIdentity::new("tester");

        let first = migrate(StoreConfig::new(dir.path()), &user).unwrap();
        assert_eq!(first.created.len(), schema::TABLES.len());

        let second = migrate(StoreConfig::new(dir.path()), &user).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.target_version, schema::SCHEMA_VERSION);
    }
}
