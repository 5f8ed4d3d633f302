//! Clear command implementation.

use editsync_store::{Database, StoreConfig, UserIdentity};
use tracing::{info, warn};

/// Deletes every row of every managed table in the user's database.
///
/// Refuses to run without `confirmed`.
pub fn run(
    config: StoreConfig,
    user: &UserIdentity,
    confirmed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.database_path(user);
    if !confirmed {
        warn!(path = %path.display(), "refusing to clear without --yes");
        return Err("Pass --yes to delete all local data".into());
    }
    if !path.exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }

    let database = Database::new(config);
    database.connect(user)?;
    database.clear_tables()?;
    database.disconnect();

    info!(path = %path.display(), "cleared all tables");
    println!("Cleared {}", path.display());
    Ok(())
}
