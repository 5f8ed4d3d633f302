//! # editsync sync
//!
//! Client-side server communication for the editor.
//!
//! This crate provides:
//! - [`HttpTransport`], multipart POST requests with cookie replay over a
//!   pluggable [`HttpClient`]
//! - [`SyncOrchestrator`], background sends, the two-phase upload handshake
//!   and error routing
//! - [`DownloadPool`], a bounded pool of blob download workers
//! - [`ResourceRepo`], local resource revisions kept in step with the server
//!
//! ## Example
//!
//! ```no_run
//! use editsync_protocol::{BlobDownloadMethod, MethodEntity};
//! use editsync_store::Session;
//! use editsync_sync::{
//!     CookieJar, DownloadTask, HttpTransport, ReqwestClient, SyncConfig, SyncOrchestrator,
//! };
//! use std::sync::Arc;
//!
//! let config = SyncConfig::new("https://content.example.com/").with_max_connections(3);
//! let client = Arc::new(ReqwestClient::new(&config)?);
//! let transport = Arc::new(HttpTransport::new(client, Arc::new(CookieJar::new())));
//! let orchestrator = SyncOrchestrator::new(config, transport, Arc::new(Session::new()));
//!
//! let tasks = vec![DownloadTask::new(
//!     MethodEntity::BlobDownload(BlobDownloadMethod::new("blob-1")),
//!     "/tmp/blob-1",
//! )];
//! let progress = |done: usize, total: usize| println!("{done}/{total}");
//! for task in orchestrator.download_in_threads(tasks, Some(&progress)) {
//!     println!("{}: {:?}", task.destination.display(), task.status);
//! }
//! # Ok::<(), editsync_sync::SyncError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cookies;
mod download;
mod error;
mod http;
mod listener;
mod multipart;
mod orchestrator;
mod resource;

pub use config::{ResourceConfig, SyncConfig, DEFAULT_INTERNAL_PORT_MARKER, DEFAULT_MAX_CONNECTIONS};
pub use cookies::CookieJar;
pub use download::{DownloadPool, DownloadStatus, DownloadTask};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpRequest, HttpResponse, HttpTransport, MockHttpClient, RecordedRequest,
    ReqwestClient,
};
pub use listener::{
    notify, DownloadProgressListener, ErrorSink, ForwardingHandler, ProgressListener,
    ResponseHandler, ResponseListener,
};
pub use multipart::{FilePart, MultipartBody, MultipartReader};
pub use orchestrator::{OutboundRequest, SendHandle, SyncOrchestrator};
pub use resource::{Resource, ResourceRepo};
