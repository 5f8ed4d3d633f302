//! Resource repository.
//!
//! The surface the editor uses to save, load, publish and synchronize
//! resources. Revision files live under the configured resource root,
//! bookkeeping lives in the local store, and recently loaded revisions are
//! kept in a TTL cache.

use crate::config::ResourceConfig;
use crate::download::DownloadTask;
use crate::error::{SyncError, SyncResult};
use crate::listener::{notify, DownloadProgressListener, ProgressListener, ResponseHandler, ResponseListener};
use crate::multipart::FilePart;
use crate::orchestrator::{OutboundRequest, SendHandle, SyncOrchestrator};
use editsync_cache::TtlCache;
use editsync_protocol::{
    BlobDownloadMethod, MethodEntity, PublishMethod, ResourceRevisionEntity, ResponseEntity,
    ResponseStatus, UserResourceSyncMethod,
};
use editsync_store::{ResourceRevisionStore, StoreError};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// One revision of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Resource id.
    pub id: Uuid,
    /// Resource type identifier.
    pub resource_type: i32,
    /// Revision number.
    pub revision: i64,
    /// When the revision was saved (Unix timestamp in milliseconds).
    pub date_ms: i64,
    /// Serialized content.
    pub data: Vec<u8>,
}

/// Saves, loads and synchronizes resources.
pub struct ResourceRepo {
    config: ResourceConfig,
    store: ResourceRevisionStore,
    cache: TtlCache<(Uuid, i64), Resource>,
    orchestrator: SyncOrchestrator,
    last_sync_ms: AtomicI64,
    // Serializes revision allocation with the file write and row insert.
    write_lock: Mutex<()>,
}

impl ResourceRepo {
    /// Creates a repository.
    pub fn new(
        config: ResourceConfig,
        store: ResourceRevisionStore,
        orchestrator: SyncOrchestrator,
    ) -> Self {
        let cache = TtlCache::new(config.cache_ttl);
        Self {
            config,
            store,
            cache,
            orchestrator,
            last_sync_ms: AtomicI64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the revision bookkeeping store.
    pub fn store(&self) -> &ResourceRevisionStore {
        &self.store
    }

    /// Returns the time of the last successful sync (Unix milliseconds).
    pub fn last_sync_ms(&self) -> i64 {
        self.last_sync_ms.load(Ordering::Acquire)
    }

    /// Saves `data` as a new revision of a resource and returns its number.
    ///
    /// The first save registers the resource. The new revision is not yet
    /// uploaded.
    pub fn save(&self, id: Uuid, resource_type: i32, data: &[u8]) -> SyncResult<i64> {
        let _guard = self.write_lock.lock();
        let revision = match self.store.latest_revision(id) {
            Ok(latest) => latest.revision + 1,
            Err(StoreError::ResourceNotFound { .. }) => 1,
            Err(e) => return Err(e.into()),
        };

        let path = self.config.revision_path(id, revision);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;

        if !self.store.exists(id)? {
            self.store.add(id, resource_type)?;
        }
        let date_ms = now_ms();
        self.store.add_revision(id, revision, date_ms)?;

        self.cache.add(
            (id, revision),
            Resource {
                id,
                resource_type,
                revision,
                date_ms,
                data: data.to_vec(),
            },
        );
        tracing::debug!(%id, revision, bytes = data.len(), "saved resource");
        Ok(revision)
    }

    /// Loads a revision of a resource, the latest one when `revision` is `None`.
    ///
    /// Returns `None` if the resource or revision does not exist locally.
    pub fn load(&self, id: Uuid, revision: Option<i64>) -> SyncResult<Option<Resource>> {
        let revision = match revision {
            Some(revision) => revision,
            None => match self.store.latest_revision(id) {
                Ok(latest) => latest.revision,
                Err(StoreError::ResourceNotFound { .. }) => return Ok(None),
                Err(e) => return Err(e.into()),
            },
        };

        if let Some(resource) = self.cache.get_copy(&(id, revision)) {
            return Ok(Some(resource));
        }

        let data = match fs::read(self.config.revision_path(id, revision)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let resource_type = match self.store.resource_type(id) {
            Ok(resource_type) => resource_type,
            Err(StoreError::ResourceNotFound { .. }) => 0,
            Err(e) => return Err(e.into()),
        };
        let date_ms = self
            .store
            .revisions(id)?
            .into_iter()
            .find(|r| r.revision == revision)
            .map_or(0, |r| r.date_ms);

        let resource = Resource {
            id,
            resource_type,
            revision,
            date_ms,
            data,
        };
        self.cache.add((id, revision), resource.clone());
        Ok(Some(resource))
    }

    /// Publishes the latest revision of every listed resource.
    pub fn publish(
        self: &Arc<Self>,
        ids: &[Uuid],
        progress: Option<Arc<dyn ProgressListener>>,
        listeners: Vec<Arc<dyn ResponseListener>>,
    ) -> SyncResult<SendHandle> {
        let mut resources = Vec::with_capacity(ids.len());
        let mut files = Vec::with_capacity(ids.len());
        for &id in ids {
            let latest = self.store.latest_revision(id)?;
            let mut entity = ResourceRevisionEntity::new(id, self.store.resource_type(id)?);
            entity.revisions.push(latest);
            resources.push(entity);
            files.push(FilePart::new(
                id.to_string(),
                self.config.revision_path(id, latest.revision),
            ));
        }

        let mut request = OutboundRequest::new(MethodEntity::Publish(PublishMethod { resources }))
            .with_files(files)
            .with_listeners(listeners);
        if let Some(progress) = progress {
            request = request.with_progress(progress);
        }
        self.orchestrator
            .send_in_new_thread(request, Arc::clone(self) as Arc<dyn ResponseHandler>)
    }

    /// Uploads every revision not yet on the server and reports locally
    /// removed resources.
    pub fn sync_user_resources(
        self: &Arc<Self>,
        listeners: Vec<Arc<dyn ResponseListener>>,
    ) -> SyncResult<SendHandle> {
        let resources = self.store.unsynced_revisions()?;
        let removed = self.store.removed_resources()?;

        let files = resources
            .iter()
            .flat_map(|entity| {
                entity.revisions.iter().map(move |r| {
                    FilePart::new(
                        format!("{}_{}", entity.resource_id, r.revision),
                        self.config.revision_path(entity.resource_id, r.revision),
                    )
                })
            })
            .collect();

        tracing::info!(
            resources = resources.len(),
            removed = removed.len(),
            "syncing user resources"
        );
        let method = MethodEntity::UserResourceSync(UserResourceSyncMethod {
            resources,
            removed,
            last_sync_ms: self.last_sync_ms(),
        });
        let request = OutboundRequest::new(method)
            .with_files(files)
            .with_listeners(listeners);
        self.orchestrator
            .send_in_new_thread(request, Arc::clone(self) as Arc<dyn ResponseHandler>)
    }

    /// Downloads blobs to their destinations, blocking until all finished.
    pub fn download_blobs(
        &self,
        blobs: Vec<(String, PathBuf)>,
        progress: Option<&dyn DownloadProgressListener>,
    ) -> Vec<DownloadTask> {
        let tasks = blobs
            .into_iter()
            .map(|(key, destination)| {
                DownloadTask::new(
                    MethodEntity::BlobDownload(BlobDownloadMethod::new(key)),
                    destination,
                )
            })
            .collect();
        self.orchestrator.download_in_threads(tasks, progress)
    }

    /// Removes a resource with all its revisions and records the removal
    /// for the next sync.
    pub fn remove(&self, id: Uuid) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        for revision in self.store.revisions(id)? {
            self.cache.remove(&(id, revision.revision));
        }
        self.store.remove_revisions(id)?;
        self.store.remove(id)?;
        self.store.add_as_removed(id)?;

        match fs::remove_dir_all(self.config.resource_dir(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn on_published(&self, method: &PublishMethod, status: ResponseStatus) -> SyncResult<()> {
        match status {
            s if s.is_successful() => {
                for resource in &method.resources {
                    self.store.set_published(resource.resource_id, true)?;
                }
                Ok(())
            }
            ResponseStatus::FailedUserNotLoggedIn => Err(SyncError::NotLoggedIn),
            _ => Ok(()),
        }
    }

    fn on_synced(&self, method: &UserResourceSyncMethod, status: ResponseStatus) -> SyncResult<()> {
        match status {
            // Partial success leaves everything unsynced; the next sync resends it.
            ResponseStatus::Success => {
                for resource in &method.resources {
                    if let Some((from, to)) = resource.revision_span() {
                        self.store.mark_uploaded_range(resource.resource_id, from, to)?;
                    }
                }
                for &id in &method.removed {
                    self.store.remove_from_removed(id)?;
                }
                self.last_sync_ms.store(now_ms(), Ordering::Release);
                Ok(())
            }
            ResponseStatus::FailedUserNotLoggedIn => Err(SyncError::NotLoggedIn),
            _ => Ok(()),
        }
    }
}

impl ResponseHandler for ResourceRepo {
    fn handle_response(
        &self,
        method: &MethodEntity,
        response: Option<ResponseEntity>,
        listeners: &[Arc<dyn ResponseListener>],
    ) -> SyncResult<()> {
        let outcome = match (method, &response) {
            (MethodEntity::Publish(m), Some(ResponseEntity::Publish(r))) => {
                self.on_published(m, r.status)
            }
            (MethodEntity::UserResourceSync(m), Some(ResponseEntity::UserResourceSync(r))) => {
                self.on_synced(m, r.status)
            }
            _ => Ok(()),
        };
        notify(listeners, method, response.as_ref());
        outcome
    }
}

impl std::fmt::Debug for ResourceRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRepo")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .finish()
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
