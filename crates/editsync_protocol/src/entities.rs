//! Entities shared by several methods.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single revision of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntity {
    /// Revision number.
    pub revision: i64,
    /// When the revision was created (Unix timestamp in milliseconds).
    pub date_ms: i64,
}

impl RevisionEntity {
    /// Creates a revision entity.
    pub fn new(revision: i64, date_ms: i64) -> Self {
        Self { revision, date_ms }
    }
}

/// A resource together with a set of its revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRevisionEntity {
    /// Resource id.
    pub resource_id: Uuid,
    /// Resource type identifier as stored in the `resource` table.
    pub resource_type: i32,
    /// Revisions, ordered by revision number.
    pub revisions: Vec<RevisionEntity>,
}

impl ResourceRevisionEntity {
    /// Creates an entity with no revisions.
    pub fn new(resource_id: Uuid, resource_type: i32) -> Self {
        Self {
            resource_id,
            resource_type,
            revisions: Vec::new(),
        }
    }

    /// Returns the lowest and highest revision numbers, if any.
    pub fn revision_span(&self) -> Option<(i64, i64)> {
        let min = self.revisions.iter().map(|r| r.revision).min()?;
        let max = self.revisions.iter().map(|r| r.revision).max()?;
        Some((min, max))
    }
}
