//! Methods a client can call on the server.

use crate::codec::{from_cbor, to_cbor, CodecResult};
use crate::entities::ResourceRevisionEntity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A server method call.
///
/// Every variant maps to one server endpoint, see [`MethodEntity::method_name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodEntity {
    /// Ask the server for a one-time upload URL.
    GetUploadUrl(GetUploadUrlMethod),
    /// Download a stored blob.
    BlobDownload(BlobDownloadMethod),
    /// Submit a bug report.
    BugReport(BugReportMethod),
    /// Publish resources.
    Publish(PublishMethod),
    /// Upload unsynced user resource revisions.
    UserResourceSync(UserResourceSyncMethod),
}

impl MethodEntity {
    /// Returns the endpoint name of this method, relative to the server host.
    pub fn method_name(&self) -> &'static str {
        match self {
            MethodEntity::GetUploadUrl(_) => "getuploadurl",
            MethodEntity::BlobDownload(_) => "blobdownload",
            MethodEntity::BugReport(_) => "bugreport",
            MethodEntity::Publish(_) => "publish",
            MethodEntity::UserResourceSync(_) => "userresourcesync",
        }
    }

    /// Returns true for diagnostic submissions.
    ///
    /// Errors raised while handling a bug report are never routed to the global
    /// error sink.
    pub fn is_bug_report(&self) -> bool {
        matches!(self, MethodEntity::BugReport(_))
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

/// Requests an upload URL that redirects to `redirect_method` once the upload finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUploadUrlMethod {
    /// Method the server invokes after the files have been received.
    pub redirect_method: String,
}

impl GetUploadUrlMethod {
    /// Creates a new upload URL request.
    pub fn new(redirect_method: impl Into<String>) -> Self {
        Self {
            redirect_method: redirect_method.into(),
        }
    }
}

/// Downloads the blob stored under `blob_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDownloadMethod {
    /// Server-side key of the blob.
    pub blob_key: String,
}

impl BlobDownloadMethod {
    /// Creates a new blob download request.
    pub fn new(blob_key: impl Into<String>) -> Self {
        Self {
            blob_key: blob_key.into(),
        }
    }
}

/// A bug report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReportMethod {
    /// Short subject line.
    pub subject: String,
    /// Free-form description.
    pub description: String,
    /// Captured error text, if any.
    pub exception: Option<String>,
    /// Client platform and version.
    pub system_info: String,
}

/// Publishes the listed resources.
///
/// The latest revision of every resource is attached as a file part whose
/// field name is the resource id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMethod {
    /// Resources to publish.
    pub resources: Vec<ResourceRevisionEntity>,
}

/// Uploads locally created revisions and reports locally removed resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResourceSyncMethod {
    /// Revisions that have not yet been uploaded.
    pub resources: Vec<ResourceRevisionEntity>,
    /// Resources removed on this client since the last sync.
    pub removed: Vec<Uuid>,
    /// Time of the last successful sync (Unix timestamp in milliseconds).
    pub last_sync_ms: i64,
}
