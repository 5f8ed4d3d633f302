//! Server responses.

use crate::codec::{from_cbor, to_cbor, CodecResult};
use serde::{Deserialize, Serialize};

/// Outcome reported by the server for a method call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// Everything succeeded.
    Success,
    /// Some of the work succeeded.
    SuccessPartial,
    /// The server failed internally.
    FailedServerError,
    /// The server rejected the call because the session is not logged in.
    FailedUserNotLoggedIn,
}

impl ResponseStatus {
    /// Returns true for full or partial success.
    pub fn is_successful(&self) -> bool {
        matches!(self, ResponseStatus::Success | ResponseStatus::SuccessPartial)
    }
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseEntity {
    /// Reply to `GetUploadUrl`.
    GetUploadUrl(GetUploadUrlResponse),
    /// Reply to `Publish`.
    Publish(PublishResponse),
    /// Reply to `UserResourceSync`.
    UserResourceSync(UserResourceSyncResponse),
    /// Reply to `BugReport`.
    BugReport(BugReportResponse),
}

impl ResponseEntity {
    /// Returns the status carried by this response, if it has one.
    pub fn status(&self) -> Option<ResponseStatus> {
        match self {
            ResponseEntity::GetUploadUrl(_) => None,
            ResponseEntity::Publish(r) => Some(r.status),
            ResponseEntity::UserResourceSync(r) => Some(r.status),
            ResponseEntity::BugReport(r) => Some(r.status),
        }
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

/// Where to upload files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUploadUrlResponse {
    /// One-time upload URL. May reference an internal port.
    pub upload_url: Option<String>,
}

/// Reply to a publish call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Outcome.
    pub status: ResponseStatus,
}

/// Reply to a user resource sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResourceSyncResponse {
    /// Outcome.
    pub status: ResponseStatus,
}

/// Reply to a bug report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReportResponse {
    /// Outcome.
    pub status: ResponseStatus,
}
