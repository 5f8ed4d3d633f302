//! Callback traits.
//!
//! Every trait is implemented for matching closures, so callers can pass
//! `Arc::new(|..| ..)` where a listener is expected.

use crate::error::{SyncError, SyncResult};
use editsync_protocol::{MethodEntity, ResponseEntity};
use std::sync::Arc;

/// Receives the outcome of a server call.
pub trait ResponseListener: Send + Sync {
    /// Called on the worker thread once the call finished.
    ///
    /// `response` is `None` when the request could not be sent or the reply
    /// could not be decoded.
    fn on_response(&self, method: &MethodEntity, response: Option<&ResponseEntity>);
}

impl<F> ResponseListener for F
where
    F: Fn(&MethodEntity, Option<&ResponseEntity>) + Send + Sync,
{
    fn on_response(&self, method: &MethodEntity, response: Option<&ResponseEntity>) {
        self(method, response);
    }
}

/// Receives upload progress.
pub trait ProgressListener: Send + Sync {
    /// Called as request bytes are written.
    fn on_progress(&self, written: u64, total: u64);
}

impl<F> ProgressListener for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, written: u64, total: u64) {
        self(written, total);
    }
}

/// Receives batch download progress.
pub trait DownloadProgressListener: Send + Sync {
    /// Called with the number of finished downloads out of `total`.
    fn on_download_progress(&self, completed: usize, total: usize);
}

impl<F> DownloadProgressListener for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_download_progress(&self, completed: usize, total: usize) {
        self(completed, total);
    }
}

/// Application-wide destination for errors raised while handling responses.
pub trait ErrorSink: Send + Sync {
    /// Reports an error.
    fn report(&self, method: &MethodEntity, error: &SyncError);
}

impl<F> ErrorSink for F
where
    F: Fn(&MethodEntity, &SyncError) + Send + Sync,
{
    fn report(&self, method: &MethodEntity, error: &SyncError) {
        self(method, error);
    }
}

/// Processes a server response and notifies listeners.
pub trait ResponseHandler: Send + Sync {
    /// Handles the outcome of `method`.
    fn handle_response(
        &self,
        method: &MethodEntity,
        response: Option<ResponseEntity>,
        listeners: &[Arc<dyn ResponseListener>],
    ) -> SyncResult<()>;
}

/// A handler that only forwards responses to the listeners.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardingHandler;

impl ResponseHandler for ForwardingHandler {
    fn handle_response(
        &self,
        method: &MethodEntity,
        response: Option<ResponseEntity>,
        listeners: &[Arc<dyn ResponseListener>],
    ) -> SyncResult<()> {
        notify(listeners, method, response.as_ref());
        Ok(())
    }
}

/// Calls every listener.
pub fn notify(
    listeners: &[Arc<dyn ResponseListener>],
    method: &MethodEntity,
    response: Option<&ResponseEntity>,
) {
    for listener in listeners {
        listener.on_response(method, response);
    }
}
