//! Resource revision bookkeeping.
//!
//! Tracks which resources exist locally, their revisions, whether each
//! revision has reached the server, and which resources were removed
//! locally since the last sync.

use crate::cursor::Cursor;
use crate::error::{StoreError, StoreResult};
use crate::gateway::{ExecOutcome, SqliteGateway};
use editsync_protocol::{ResourceRevisionEntity, RevisionEntity};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Reads and writes the `resource`, `resource_revision` and
/// `resource_removed` tables.
#[derive(Debug)]
pub struct ResourceRevisionStore {
    gateway: SqliteGateway,
}

impl ResourceRevisionStore {
    /// Creates a store on top of a gateway.
    pub fn new(gateway: SqliteGateway) -> Self {
        Self { gateway }
    }

    /// Returns the underlying gateway.
    pub fn gateway(&self) -> &SqliteGateway {
        &self.gateway
    }

    /// Returns true if the resource is registered.
    pub fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let mut cursor = self
            .gateway
            .raw_query(&format!("SELECT NULL FROM resource WHERE uuid='{id}'"))?;
        Ok(cursor.next())
    }

    /// Registers a resource of the given type.
    pub fn add(&self, id: Uuid, resource_type: i32) -> StoreResult<ExecOutcome> {
        self.gateway.exec_sql(format!(
            "INSERT INTO resource (uuid, type) VALUES ('{id}', {resource_type})"
        ))
    }

    /// Adds a revision. The revision starts out not uploaded.
    pub fn add_revision(&self, id: Uuid, revision: i64, date_ms: i64) -> StoreResult<ExecOutcome> {
        self.gateway.exec_sql(format!(
            "INSERT INTO resource_revision (uuid, revision, date) VALUES ('{id}', {revision}, {date_ms})"
        ))
    }

    /// Unregisters a resource. Its revisions are kept.
    pub fn remove(&self, id: Uuid) -> StoreResult<ExecOutcome> {
        self.gateway
            .exec_sql(format!("DELETE FROM resource WHERE uuid='{id}'"))
    }

    /// Removes every revision of a resource.
    pub fn remove_revisions(&self, id: Uuid) -> StoreResult<ExecOutcome> {
        self.gateway
            .exec_sql(format!("DELETE FROM resource_revision WHERE uuid='{id}'"))
    }

    /// Removes `from_revision` and every later revision of a resource.
    pub fn remove_revisions_from(&self, id: Uuid, from_revision: i64) -> StoreResult<ExecOutcome> {
        self.gateway.exec_sql(format!(
            "DELETE FROM resource_revision WHERE uuid='{id}' AND revision>={from_revision}"
        ))
    }

    /// Removes every resource of a type together with its revisions.
    ///
    /// With `record_removed`, each resource is also recorded as removed so
    /// the next sync reports it to the server.
    pub fn remove_all(&self, resource_type: i32, record_removed: bool) -> StoreResult<()> {
        for id in self.all_of_type(resource_type)? {
            self.remove_revisions(id)?;
            if record_removed {
                self.add_as_removed(id)?;
            }
        }
        self.gateway
            .exec_sql(format!("DELETE FROM resource WHERE type={resource_type}"))?;
        Ok(())
    }

    /// Records a resource as removed locally.
    pub fn add_as_removed(&self, id: Uuid) -> StoreResult<ExecOutcome> {
        self.gateway
            .exec_sql(format!("INSERT OR IGNORE INTO resource_removed VALUES ('{id}')"))
    }

    /// Forgets that a resource was removed locally.
    pub fn remove_from_removed(&self, id: Uuid) -> StoreResult<ExecOutcome> {
        self.gateway
            .exec_sql(format!("DELETE FROM resource_removed WHERE uuid='{id}'"))
    }

    /// Returns every resource removed locally since the last sync.
    pub fn removed_resources(&self) -> StoreResult<Vec<Uuid>> {
        let mut cursor = self.gateway.raw_query("SELECT uuid FROM resource_removed")?;
        let mut ids = Vec::with_capacity(cursor.row_count());
        while cursor.next() {
            ids.push(read_uuid(&cursor, 0)?);
        }
        Ok(ids)
    }

    /// Returns every resource of a type.
    pub fn all_of_type(&self, resource_type: i32) -> StoreResult<Vec<Uuid>> {
        let mut cursor = self.gateway.raw_query(&format!(
            "SELECT uuid FROM resource WHERE type={resource_type}"
        ))?;
        let mut ids = Vec::with_capacity(cursor.row_count());
        while cursor.next() {
            ids.push(read_uuid(&cursor, 0)?);
        }
        Ok(ids)
    }

    /// Returns the number of resources of a type.
    pub fn count_of_type(&self, resource_type: i32) -> StoreResult<usize> {
        let mut cursor = self.gateway.raw_query(&format!(
            "SELECT COUNT(*) FROM resource WHERE type={resource_type}"
        ))?;
        if !cursor.next() {
            return Ok(0);
        }
        let count = cursor.get_i64(0)?;
        usize::try_from(count).map_err(|_| StoreError::invalid_data(format!("negative count {count}")))
    }

    /// Returns every revision of a resource, oldest first.
    pub fn revisions(&self, id: Uuid) -> StoreResult<Vec<RevisionEntity>> {
        let mut cursor = self.gateway.raw_query(&format!(
            "SELECT revision, date FROM resource_revision WHERE uuid='{id}' ORDER BY revision"
        ))?;
        let mut revisions = Vec::with_capacity(cursor.row_count());
        while cursor.next() {
            revisions.push(RevisionEntity::new(cursor.get_i64(0)?, cursor.get_i64(1)?));
        }
        Ok(revisions)
    }

    /// Returns the latest revision of a resource.
    pub fn latest_revision(&self, id: Uuid) -> StoreResult<RevisionEntity> {
        let mut cursor = self.gateway.raw_query(&format!(
            "SELECT revision, date FROM resource_revision WHERE uuid='{id}' \
             ORDER BY revision DESC LIMIT 1"
        ))?;
        if !cursor.next() {
            return Err(StoreError::ResourceNotFound { id });
        }
        Ok(RevisionEntity::new(cursor.get_i64(0)?, cursor.get_i64(1)?))
    }

    /// Returns the type of a resource.
    pub fn resource_type(&self, id: Uuid) -> StoreResult<i32> {
        let mut cursor = self
            .gateway
            .raw_query(&format!("SELECT type FROM resource WHERE uuid='{id}'"))?;
        if !cursor.next() {
            return Err(StoreError::ResourceNotFound { id });
        }
        cursor.get_i32(0)
    }

    /// Returns true if the resource has been published.
    pub fn is_published(&self, id: Uuid) -> StoreResult<bool> {
        let mut cursor = self.gateway.raw_query(&format!(
            "SELECT published FROM resource WHERE uuid='{id}' LIMIT 1"
        ))?;
        if !cursor.next() {
            return Err(StoreError::ResourceNotFound { id });
        }
        Ok(cursor.get_i64(0)? == 1)
    }

    /// Marks a resource as published or unpublished.
    pub fn set_published(&self, id: Uuid, published: bool) -> StoreResult<ExecOutcome> {
        self.gateway.exec_sql(format!(
            "UPDATE resource SET published={} WHERE uuid='{id}'",
            i32::from(published)
        ))
    }

    /// Returns every revision not yet uploaded, grouped by resource.
    ///
    /// Resources are ordered by id and revisions by revision number. The
    /// resource type is filled in when the resource is still registered.
    pub fn unsynced_revisions(&self) -> StoreResult<Vec<ResourceRevisionEntity>> {
        let mut cursor = self.gateway.raw_query(
            "SELECT uuid, revision, date FROM resource_revision WHERE uploaded=0 ORDER BY revision",
        )?;

        let mut grouped: BTreeMap<Uuid, ResourceRevisionEntity> = BTreeMap::new();
        while cursor.next() {
            if cursor.is_null(0)? {
                tracing::warn!("skipping resource revision without uuid");
                continue;
            }
            let id = read_uuid(&cursor, 0)?;
            grouped
                .entry(id)
                .or_insert_with(|| ResourceRevisionEntity::new(id, 0))
                .revisions
                .push(RevisionEntity::new(cursor.get_i64(1)?, cursor.get_i64(2)?));
        }

        for entity in grouped.values_mut() {
            self.gateway.raw_query_into(
                &mut cursor,
                &format!("SELECT type FROM resource WHERE uuid='{}' LIMIT 1", entity.resource_id),
            )?;
            if cursor.next() {
                entity.resource_type = cursor.get_i32(0)?;
            }
        }

        Ok(grouped.into_values().collect())
    }

    /// Marks a single revision as uploaded.
    pub fn mark_uploaded(&self, id: Uuid, revision: i64) -> StoreResult<ExecOutcome> {
        self.gateway.exec_sql(format!(
            "UPDATE resource_revision SET uploaded=1 WHERE uuid='{id}' AND revision={revision}"
        ))
    }

    /// Marks the revisions `from..=to` as uploaded.
    pub fn mark_uploaded_range(&self, id: Uuid, from: i64, to: i64) -> StoreResult<ExecOutcome> {
        self.gateway.exec_sql(format!(
            "UPDATE resource_revision SET uploaded=1 WHERE uuid='{id}' \
             AND revision>={from} AND revision<={to}"
        ))
    }
}

fn read_uuid(cursor: &Cursor, column: usize) -> StoreResult<Uuid> {
    let text = cursor
        .get_string(column)?
        .ok_or_else(|| StoreError::invalid_data(format!("column {column}: missing uuid")))?;
    Uuid::parse_str(&text).map_err(|e| StoreError::invalid_data(format!("bad uuid {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::database::Database;
    use crate::session::UserIdentity;
    use std::sync::Arc;
    use tempfile::TempDir;

    const LEVEL: i32 = 3;
    const ENEMY: i32 = 5;

    fn setup() -> (TempDir, ResourceRevisionStore) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::new(StoreConfig::new(dir.path())));
        db.connect(&UserIdentity::new("tester")).unwrap();
        (dir, ResourceRevisionStore::new(SqliteGateway::new(db)))
    }

    #[test]
    fn add_and_query_resources() {
        let (_dir, store) = setup();
        let level = Uuid::new_v4();
        let enemy = Uuid::new_v4();

        assert!(!store.exists(level).unwrap());
        store.add(level, LEVEL).unwrap();
        store.add(enemy, ENEMY).unwrap();

        assert!(store.exists(level).unwrap());
        assert_eq!(store.resource_type(enemy).unwrap(), ENEMY);
        assert_eq!(store.all_of_type(LEVEL).unwrap(), vec![level]);
        assert_eq!(store.count_of_type(ENEMY).unwrap(), 1);
        assert_eq!(store.count_of_type(99).unwrap(), 0);
    }

    #[test]
    fn revisions_and_latest() {
        let (_dir, store) = setup();
        let id = Uuid::new_v4();
        store.add(id, LEVEL).unwrap();

        assert!(matches!(
            store.latest_revision(id),
            Err(StoreError::ResourceNotFound { .. })
        ));

        store.add_revision(id, 2, 200).unwrap();
        store.add_revision(id, 1, 100).unwrap();
        store.add_revision(id, 3, 300).unwrap();

        let revisions = store.revisions(id).unwrap();
        assert_eq!(
            revisions.iter().map(|r| r.revision).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(store.latest_revision(id).unwrap(), RevisionEntity::new(3, 300));

        store.remove_revisions_from(id, 2).unwrap();
        assert_eq!(store.latest_revision(id).unwrap().revision, 1);
    }

    #[test]
    fn publish_flag_is_per_resource() {
        let (_dir, store) = setup();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.add(a, LEVEL).unwrap();
        store.add(b, LEVEL).unwrap();

        store.set_published(a, true).unwrap();

        assert!(store.is_published(a).unwrap());
        assert!(!store.is_published(b).unwrap());
        assert!(store.is_published(Uuid::new_v4()).is_err());
    }

    #[test]
    fn unsynced_revisions_are_grouped() {
        let (_dir, store) = setup();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.add(a, LEVEL).unwrap();
        for rev in 1..=3 {
            store.add_revision(a, rev, rev * 10).unwrap();
        }
        store.add_revision(b, 1, 10).unwrap();
        store.mark_uploaded(a, 1).unwrap();

        let unsynced = store.unsynced_revisions().unwrap();
        assert_eq!(unsynced.len(), 2);

        let entity_a = unsynced.iter().find(|e| e.resource_id == a).unwrap();
        assert_eq!(entity_a.resource_type, LEVEL);
        assert_eq!(entity_a.revision_span(), Some((2, 3)));

        let entity_b = unsynced.iter().find(|e| e.resource_id == b).unwrap();
        assert_eq!(entity_b.resource_type, 0);

        store.mark_uploaded_range(a, 2, 3).unwrap();
        store.mark_uploaded(b, 1).unwrap();
        assert!(store.unsynced_revisions().unwrap().is_empty());
    }

    #[test]
    fn removed_resources_round_trip() {
        let (_dir, store) = setup();
        let a = Uuid::new_v4();
        store.add_as_removed(a).unwrap();
        store.add_as_removed(a).unwrap();
        assert_eq!(store.removed_resources().unwrap(), vec![a]);

        store.remove_from_removed(a).unwrap();
        assert!(store.removed_resources().unwrap().is_empty());
    }

    #[test]
    fn remove_all_records_removed() {
        let (_dir, store) = setup();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.add(a, LEVEL).unwrap();
        store.add(b, ENEMY).unwrap();
        store.add_revision(a, 1, 0).unwrap();

        store.remove_all(LEVEL, true).unwrap();

        assert!(!store.exists(a).unwrap());
        assert!(store.exists(b).unwrap());
        assert!(store.revisions(a).unwrap().is_empty());
        assert_eq!(store.removed_resources().unwrap(), vec![a]);
    }
}
