//! # editsync protocol
//!
//! Wire entities exchanged between the editor client and the content server.
//!
//! This crate provides:
//! - [`MethodEntity`], the requests a client can issue
//! - [`ResponseEntity`], the server's replies
//! - Shared entities such as [`ResourceRevisionEntity`]
//! - CBOR encoding/decoding of all of the above
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use editsync_protocol::{GetUploadUrlMethod, MethodEntity};
//!
//! let method = MethodEntity::GetUploadUrl(GetUploadUrlMethod::new("publish"));
//! let bytes = method.encode().unwrap();
//! assert_eq!(MethodEntity::decode(&bytes).unwrap(), method);
//! assert_eq!(method.method_name(), "getuploadurl");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod entities;
mod methods;
mod responses;

pub use codec::{from_cbor, to_cbor, CodecError, CodecResult};
pub use entities::{ResourceRevisionEntity, RevisionEntity};
pub use methods::{
    BlobDownloadMethod, BugReportMethod, GetUploadUrlMethod, MethodEntity, PublishMethod,
    UserResourceSyncMethod,
};
pub use responses::{
    BugReportResponse, GetUploadUrlResponse, PublishResponse, ResponseEntity, ResponseStatus,
    UserResourceSyncResponse,
};
