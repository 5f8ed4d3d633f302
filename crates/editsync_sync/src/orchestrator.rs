//! Sync orchestration.
//!
//! Every outbound request runs on its own thread. Requests with attached
//! files use the two-phase upload: the client first asks the server for an
//! upload URL, then posts files and payload to it. Bulk blob downloads go
//! through the shared [`DownloadPool`].

use crate::config::SyncConfig;
use crate::download::{DownloadPool, DownloadTask};
use crate::error::{SyncError, SyncResult};
use crate::http::HttpTransport;
use crate::listener::{DownloadProgressListener, ErrorSink, ProgressListener, ResponseHandler, ResponseListener};
use crate::multipart::FilePart;
use editsync_protocol::{GetUploadUrlMethod, GetUploadUrlResponse, MethodEntity, ResponseEntity};
use editsync_store::Session;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A request to send in the background.
pub struct OutboundRequest {
    method: MethodEntity,
    files: Vec<FilePart>,
    progress: Option<Arc<dyn ProgressListener>>,
    listeners: Vec<Arc<dyn ResponseListener>>,
}

impl OutboundRequest {
    /// Creates a request without files or listeners.
    pub fn new(method: MethodEntity) -> Self {
        Self {
            method,
            files: Vec::new(),
            progress: None,
            listeners: Vec::new(),
        }
    }

    /// Attaches files, switching the request to the upload handshake.
    #[must_use]
    pub fn with_files(mut self, files: Vec<FilePart>) -> Self {
        self.files = files;
        self
    }

    /// Sets the upload progress listener.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressListener>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Adds a response listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ResponseListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Adds several response listeners.
    #[must_use]
    pub fn with_listeners(mut self, listeners: impl IntoIterator<Item = Arc<dyn ResponseListener>>) -> Self {
        self.listeners.extend(listeners);
        self
    }

    /// Returns the method.
    pub fn method(&self) -> &MethodEntity {
        &self.method
    }
}

impl std::fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundRequest")
            .field("method", &self.method.method_name())
            .field("files", &self.files)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Handle to a request running in the background.
#[derive(Debug)]
pub struct SendHandle {
    method: &'static str,
    handle: JoinHandle<SyncResult<()>>,
}

impl SendHandle {
    /// Returns the name of the method being sent.
    pub fn method_name(&self) -> &'static str {
        self.method
    }

    /// Returns true once the worker thread finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker thread.
    ///
    /// Returns the handler error that was not routed to the error sink.
    pub fn join(self) -> SyncResult<()> {
        self.handle.join().map_err(|_| SyncError::WorkerPanicked)?
    }
}

struct Shared {
    config: SyncConfig,
    transport: Arc<HttpTransport>,
    pool: Arc<DownloadPool>,
    session: Arc<Session>,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

/// Sends requests to the server and dispatches responses.
///
/// Cloning is cheap; clones share the transport and the download pool.
#[derive(Clone)]
pub struct SyncOrchestrator {
    shared: Arc<Shared>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with its own download pool.
    pub fn new(config: SyncConfig, transport: Arc<HttpTransport>, session: Arc<Session>) -> Self {
        let pool = Arc::new(DownloadPool::new(Arc::clone(&transport), config.clone()));
        Self::with_pool(config, transport, pool, session)
    }

    /// Creates an orchestrator sharing an existing download pool.
    pub fn with_pool(
        config: SyncConfig,
        transport: Arc<HttpTransport>,
        pool: Arc<DownloadPool>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                pool,
                session,
                error_sink: None,
            }),
        }
    }

    /// Sets the sink receiving handler errors while a user is logged in.
    #[must_use]
    pub fn with_error_sink(self, sink: Arc<dyn ErrorSink>) -> Self {
        let shared = &self.shared;
        Self {
            shared: Arc::new(Shared {
                config: shared.config.clone(),
                transport: Arc::clone(&shared.transport),
                pool: Arc::clone(&shared.pool),
                session: Arc::clone(&shared.session),
                error_sink: Some(sink),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Returns the download pool.
    pub fn pool(&self) -> &Arc<DownloadPool> {
        &self.shared.pool
    }

    /// Sends a request on a new thread.
    ///
    /// The handler runs on that thread, even when no response arrived. If
    /// it fails, the error goes to the error sink when a user is logged in
    /// and the method is not a bug report; otherwise it is returned by
    /// [`SendHandle::join`].
    pub fn send_in_new_thread(
        &self,
        request: OutboundRequest,
        handler: Arc<dyn ResponseHandler>,
    ) -> SyncResult<SendHandle> {
        let shared = Arc::clone(&self.shared);
        let method = request.method.method_name();
        let handle = thread::Builder::new()
            .name(format!("editsync-send-{method}"))
            .spawn(move || shared.send(request, handler.as_ref()))?;
        Ok(SendHandle { method, handle })
    }

    /// Sends a method to its endpoint and decodes the reply.
    pub fn serialize_and_send(&self, method: &MethodEntity) -> Option<ResponseEntity> {
        self.shared.serialize_and_send(method)
    }

    /// Uploads files together with a method through the upload handshake.
    pub fn serialize_and_upload(
        &self,
        method: &MethodEntity,
        files: &[FilePart],
        progress: Option<Arc<dyn ProgressListener>>,
    ) -> Option<ResponseEntity> {
        self.shared.serialize_and_upload(method, files, progress)
    }

    /// Sends a method and writes the reply body to `destination`.
    pub fn serialize_and_download(&self, method: &MethodEntity, destination: &Path) -> bool {
        let payload = match method.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(method = method.method_name(), error = %e, "cannot encode method");
                return false;
            }
        };
        let url = self.shared.config.method_url(method);
        self.shared.transport.download_request(&url, &payload, destination)
    }

    /// Downloads every task through the pool, blocking until all finished.
    pub fn download_in_threads(
        &self,
        tasks: Vec<DownloadTask>,
        progress: Option<&dyn DownloadProgressListener>,
    ) -> Vec<DownloadTask> {
        self.shared.pool.download_all(tasks, progress)
    }
}

impl Shared {
    fn send(&self, request: OutboundRequest, handler: &dyn ResponseHandler) -> SyncResult<()> {
        let OutboundRequest {
            method,
            files,
            progress,
            listeners,
        } = request;

        let response = if files.is_empty() {
            self.serialize_and_send(&method)
        } else {
            self.serialize_and_upload(&method, &files, progress)
        };

        let Err(error) = handler.handle_response(&method, response, &listeners) else {
            return Ok(());
        };

        match &self.error_sink {
            Some(sink) if self.session.is_logged_in() && !method.is_bug_report() => {
                sink.report(&method, &error);
                Ok(())
            }
            _ => {
                tracing::error!(method = method.method_name(), error = %error, "response handling failed");
                Err(error)
            }
        }
    }

    fn serialize_and_send(&self, method: &MethodEntity) -> Option<ResponseEntity> {
        let payload = encode(method)?;
        let url = self.config.method_url(method);
        let body = self.transport.send_request(&url, &payload, &[], None)?;
        decode(method, &body)
    }

    fn serialize_and_upload(
        &self,
        method: &MethodEntity,
        files: &[FilePart],
        progress: Option<Arc<dyn ProgressListener>>,
    ) -> Option<ResponseEntity> {
        let payload = encode(method)?;

        let upload_url = self
            .fetch_upload_url(method)
            .map_err(|e| tracing::warn!(error = %e, "upload aborted"))
            .ok()?;
        let url = self.config.rewrite_upload_url(&upload_url);
        tracing::debug!(method = method.method_name(), url = %url, files = files.len(), "uploading");

        let body = self.transport.send_request(&url, &payload, files, progress)?;
        decode(method, &body)
    }

    fn fetch_upload_url(&self, method: &MethodEntity) -> SyncResult<String> {
        let request = MethodEntity::GetUploadUrl(GetUploadUrlMethod::new(method.method_name()));
        match self.serialize_and_send(&request) {
            Some(ResponseEntity::GetUploadUrl(GetUploadUrlResponse {
                upload_url: Some(url),
            })) => Ok(url),
            _ => Err(SyncError::MissingUploadUrl {
                method: method.method_name(),
            }),
        }
    }
}

fn encode(method: &MethodEntity) -> Option<Vec<u8>> {
    method
        .encode()
        .map_err(|e| tracing::warn!(method = method.method_name(), error = %e, "cannot encode method"))
        .ok()
}

fn decode(method: &MethodEntity, body: &[u8]) -> Option<ResponseEntity> {
    ResponseEntity::decode(body)
        .map_err(|e| tracing::warn!(method = method.method_name(), error = %e, "cannot decode response"))
        .ok()
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.shared.config)
            .field("pool", &self.shared.pool)
            .field("error_sink", &self.shared.error_sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::CookieJar;
    use crate::http::{HttpClient, HttpResponse, MockHttpClient};
    use crate::listener::ForwardingHandler;
    use editsync_protocol::{BugReportMethod, PublishMethod, PublishResponse, ResponseStatus};
    use editsync_store::UserIdentity;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    fn orchestrator(client: Arc<MockHttpClient>, session: Arc<Session>) -> SyncOrchestrator {
        let transport = Arc::new(HttpTransport::new(
            client as Arc<dyn HttpClient>,
            Arc::new(CookieJar::new()),
        ));
        SyncOrchestrator::new(SyncConfig::new("https://content.example.com/"), transport, session)
    }

    fn reply(entity: &ResponseEntity) -> HttpResponse {
        HttpResponse::new(200, entity.encode().unwrap())
    }

    fn publish_ok() -> ResponseEntity {
        ResponseEntity::Publish(PublishResponse {
            status: ResponseStatus::Success,
        })
    }

    fn publish() -> MethodEntity {
        MethodEntity::Publish(PublishMethod { resources: vec![] })
    }

    fn bug_report() -> MethodEntity {
        MethodEntity::BugReport(BugReportMethod {
            subject: "crash".into(),
            description: String::new(),
            exception: None,
            system_info: "test".into(),
        })
    }

    struct FailingHandler;

    impl ResponseHandler for FailingHandler {
        fn handle_response(
            &self,
            _method: &MethodEntity,
            _response: Option<ResponseEntity>,
            _listeners: &[Arc<dyn ResponseListener>],
        ) -> SyncResult<()> {
            Err(SyncError::handler("bookkeeping failed"))
        }
    }

    #[test]
    fn send_without_files_posts_to_method_endpoint() {
        let client = Arc::new(MockHttpClient::new());
        client.push_response(reply(&publish_ok()));
        let orchestrator = orchestrator(Arc::clone(&client), Arc::new(Session::new()));

        assert_eq!(orchestrator.serialize_and_send(&publish()), Some(publish_ok()));
        assert_eq!(client.requests()[0].url, "https://content.example.com/publish");
    }

    #[test]
    fn upload_uses_rewritten_handshake_url() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("blob");
        fs::write(&file, b"level data").unwrap();

        let client = Arc::new(MockHttpClient::new());
        client.push_response(reply(&ResponseEntity::GetUploadUrl(GetUploadUrlResponse {
            upload_url: Some("http://10.1.2.3:8888/_ah/upload/abc".into()),
        })));
        client.push_response(reply(&publish_ok()));
        let orchestrator = orchestrator(Arc::clone(&client), Arc::new(Session::new()));

        let response =
            orchestrator.serialize_and_upload(&publish(), &[FilePart::new("r1", &file)], None);
        assert_eq!(response, Some(publish_ok()));

        let requests = client.requests();
        assert_eq!(requests[0].url, "https://content.example.com/getuploadurl");
        // The handshake names the method the upload redirects to.
        assert!(String::from_utf8_lossy(&requests[0].body).contains("publish"));
        assert_eq!(requests[1].url, "https://content.example.com/_ah/upload/abc");
        assert!(String::from_utf8_lossy(&requests[1].body).contains("level data"));
    }

    #[test]
    fn upload_without_url_yields_none() {
        let client = Arc::new(MockHttpClient::new());
        client.push_response(reply(&ResponseEntity::GetUploadUrl(GetUploadUrlResponse {
            upload_url: None,
        })));
        let orchestrator = orchestrator(Arc::clone(&client), Arc::new(Session::new()));

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("blob");
        fs::write(&file, b"x").unwrap();
        assert!(orchestrator
            .serialize_and_upload(&publish(), &[FilePart::new("r1", &file)], None)
            .is_none());
        assert_eq!(client.requests().len(), 1);
    }

    #[test]
    fn handshake_without_url_is_an_error() {
        let client = Arc::new(MockHttpClient::new());
        client.push_response(reply(&ResponseEntity::GetUploadUrl(GetUploadUrlResponse {
            upload_url: None,
        })));
        client.push_error(SyncError::transport("offline"));
        let orchestrator = orchestrator(client, Arc::new(Session::new()));

        assert!(matches!(
            orchestrator.shared.fetch_upload_url(&publish()),
            Err(SyncError::MissingUploadUrl { method: "publish" })
        ));
        // A failed handshake reports the same error.
        assert!(matches!(
            orchestrator.shared.fetch_upload_url(&publish()),
            Err(SyncError::MissingUploadUrl { method: "publish" })
        ));
    }

    #[test]
    fn listeners_run_even_without_response() {
        let client = Arc::new(MockHttpClient::new());
        client.push_error(SyncError::transport("offline"));
        let orchestrator = orchestrator(client, Arc::new(Session::new()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let request = OutboundRequest::new(publish()).with_listener(Arc::new(
            move |m: &MethodEntity, r: Option<&ResponseEntity>| {
                sink.lock().push((m.method_name(), r.is_some()));
            },
        ));

        orchestrator
            .send_in_new_thread(request, Arc::new(ForwardingHandler))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(*seen.lock(), vec![("publish", false)]);
    }

    #[test]
    fn handler_errors_go_to_sink_when_logged_in() {
        let session = Arc::new(Session::new());
        session.login(UserIdentity::new("alice")).unwrap();

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let client = Arc::new(MockHttpClient::new());
        client.push_response(reply(&publish_ok()));
        let orchestrator = orchestrator(client, session).with_error_sink(Arc::new(
            move |m: &MethodEntity, e: &SyncError| sink.lock().push((m.method_name(), e.to_string())),
        ));

        let result = orchestrator
            .send_in_new_thread(OutboundRequest::new(publish()), Arc::new(FailingHandler))
            .unwrap()
            .join();

        assert!(result.is_ok());
        assert_eq!(reported.lock().len(), 1);
        assert_eq!(reported.lock()[0].0, "publish");
    }

    #[test]
    fn bug_report_errors_stay_local() {
        let session = Arc::new(Session::new());
        session.login(UserIdentity::new("alice")).unwrap();

        let reported = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&reported);
        let client = Arc::new(MockHttpClient::new());
        client.push_error(SyncError::transport("offline"));
        let orchestrator = orchestrator(client, session).with_error_sink(Arc::new(
            move |_: &MethodEntity, _: &SyncError| *sink.lock() += 1,
        ));

        let result = orchestrator
            .send_in_new_thread(OutboundRequest::new(bug_report()), Arc::new(FailingHandler))
            .unwrap()
            .join();

        assert!(matches!(result, Err(SyncError::Handler(_))));
        assert_eq!(*reported.lock(), 0);
    }

    #[test]
    fn handler_errors_stay_local_when_logged_out() {
        let client = Arc::new(MockHttpClient::new());
        client.push_error(SyncError::transport("offline"));
        let reported = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&reported);
        let orchestrator = orchestrator(client, Arc::new(Session::new())).with_error_sink(
            Arc::new(move |_: &MethodEntity, _: &SyncError| *sink.lock() += 1),
        );

        let result = orchestrator
            .send_in_new_thread(OutboundRequest::new(publish()), Arc::new(FailingHandler))
            .unwrap()
            .join();

        assert!(result.is_err());
        assert_eq!(*reported.lock(), 0);
    }
}
