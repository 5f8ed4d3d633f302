//! Managed tables.
//!
//! Every table the store owns is listed in [`TABLES`] together with the
//! additive migrations that bring an older copy of it up to
//! [`SCHEMA_VERSION`].

use crate::migration::{TableDefinition, TableMigration};

/// Target schema version.
pub const SCHEMA_VERSION: i64 = 9;

/// Name of the table recording the schema version of every managed table.
pub const VERSION_TABLE: &str = "version";

/// Resource revisions. One row per saved revision.
pub const RESOURCE_REVISION: TableDefinition = TableDefinition {
    name: "resource_revision",
    create_sql: "CREATE TABLE IF NOT EXISTS resource_revision (\
        uuid TEXT, \
        revision INTEGER, \
        date INTEGER, \
        uploaded INTEGER DEFAULT 0)",
    migrations: &[TableMigration {
        version: 2,
        statements: &["ALTER TABLE resource_revision ADD COLUMN uploaded INTEGER DEFAULT 0"],
    }],
};

/// Resources known to this client.
pub const RESOURCE: TableDefinition = TableDefinition {
    name: "resource",
    create_sql: "CREATE TABLE IF NOT EXISTS resource (\
        uuid TEXT PRIMARY KEY, \
        type INTEGER, \
        published INTEGER DEFAULT 0)",
    migrations: &[],
};

/// Resources removed locally but not yet synchronized.
pub const RESOURCE_REMOVED: TableDefinition = TableDefinition {
    name: "resource_removed",
    create_sql: "CREATE TABLE IF NOT EXISTS resource_removed (uuid TEXT PRIMARY KEY)",
    migrations: &[],
};

/// Best score per level.
pub const HIGHSCORE: TableDefinition = TableDefinition {
    name: "highscore",
    create_sql: "CREATE TABLE IF NOT EXISTS highscore (\
        level_id TEXT PRIMARY KEY, \
        score INTEGER, \
        date INTEGER, \
        synced INTEGER DEFAULT 0)",
    migrations: &[],
};

/// Per-level play statistics.
pub const LEVEL_STAT: TableDefinition = TableDefinition {
    name: "level_stat",
    create_sql: "CREATE TABLE IF NOT EXISTS level_stat (\
        uuid TEXT PRIMARY KEY, \
        bookmark INTEGER DEFAULT 0, \
        play_count INTEGER DEFAULT 0, \
        plays_to_sync INTEGER DEFAULT 0, \
        clear_count INTEGER DEFAULT 0, \
        clears_to_sync INTEGER DEFAULT 0, \
        rating INTEGER DEFAULT 0, \
        last_played INTEGER, \
        synced INTEGER DEFAULT 0, \
        comment TEXT DEFAULT '', \
        death_count INTEGER DEFAULT 0, \
        deaths_to_sync INTEGER DEFAULT 0)",
    migrations: &[
        TableMigration {
            version: 6,
            statements: &["ALTER TABLE level_stat ADD COLUMN comment TEXT DEFAULT ''"],
        },
        TableMigration {
            version: 9,
            statements: &[
                "ALTER TABLE level_stat ADD COLUMN death_count INTEGER DEFAULT 0",
                "ALTER TABLE level_stat ADD COLUMN deaths_to_sync INTEGER DEFAULT 0",
            ],
        },
    ],
};

/// Tags attached to levels.
pub const LEVEL_TAG: TableDefinition = TableDefinition {
    name: "level_tag",
    create_sql: "CREATE TABLE IF NOT EXISTS level_tag (\
        uuid TEXT, \
        tag INTEGER, \
        date INTEGER, \
        synced INTEGER DEFAULT 0)",
    migrations: &[],
};

/// Analytics sessions.
pub const ANALYTICS_SESSION: TableDefinition = TableDefinition {
    name: "analytics_session",
    create_sql: "CREATE TABLE IF NOT EXISTS analytics_session (\
        session_id TEXT, \
        start_time INTEGER, \
        end_time INTEGER DEFAULT 0, \
        screen_size TEXT)",
    migrations: &[],
};

/// Analytics scenes.
pub const ANALYTICS_SCENE: TableDefinition = TableDefinition {
    name: "analytics_scene",
    create_sql: "CREATE TABLE IF NOT EXISTS analytics_scene (\
        session_id TEXT, \
        scene_id TEXT, \
        start_time INTEGER, \
        end_time INTEGER DEFAULT 0, \
        name TEXT, \
        load_time REAL)",
    migrations: &[],
};

/// Analytics events.
pub const ANALYTICS_EVENT: TableDefinition = TableDefinition {
    name: "analytics_event",
    create_sql: "CREATE TABLE IF NOT EXISTS analytics_event (\
        scene_id TEXT, \
        time INTEGER, \
        name TEXT, \
        data TEXT, \
        type INTEGER)",
    migrations: &[TableMigration {
        version: 8,
        statements: &[
            "ALTER TABLE analytics_event ADD COLUMN type INTEGER",
            "UPDATE analytics_event SET type=0 WHERE type IS NULL",
        ],
    }],
};

/// Every managed table.
pub const TABLES: &[TableDefinition] = &[
    RESOURCE_REVISION,
    RESOURCE,
    RESOURCE_REMOVED,
    HIGHSCORE,
    LEVEL_STAT,
    LEVEL_TAG,
    ANALYTICS_SESSION,
    ANALYTICS_SCENE,
    ANALYTICS_EVENT,
];

/// Looks up a managed table by name.
pub fn table(name: &str) -> Option<&'static TableDefinition> {
    TABLES.iter().find(|t| t.name == name)
}
