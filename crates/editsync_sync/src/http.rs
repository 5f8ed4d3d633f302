//! HTTP transport.
//!
//! The actual HTTP client is abstracted behind [`HttpClient`] so tests can
//! swap in [`MockHttpClient`]. [`ReqwestClient`] is the production
//! implementation.
//!
//! [`HttpTransport`] turns payloads and file lists into multipart requests,
//! manages the session cookie and maps every network failure to `None` or
//! `false`. Nothing is retried.

use crate::config::SyncConfig;
use crate::cookies::CookieJar;
use crate::error::{SyncError, SyncResult};
use crate::listener::ProgressListener;
use crate::multipart::{FilePart, MultipartBody};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// An outgoing POST request.
pub struct HttpRequest {
    /// Target URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Body stream.
    pub body: Box<dyn Read + Send>,
    /// Body length in bytes.
    pub content_length: u64,
}

impl HttpRequest {
    /// Returns the first header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// A received response.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers. Repeated headers appear once per value.
    pub headers: Vec<(String, String)>,
    /// Body stream.
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Creates a response with an in-memory body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Box::new(Cursor::new(body.into())),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns every value of a header (case-insensitive).
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request.
    fn post(&self, request: HttpRequest) -> SyncResult<HttpResponse>;
}

/// Blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds a client with the configured timeout and user agent.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SyncError::transport(format!("http client build failed: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            // The sized body sets the length itself.
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = reqwest::blocking::Body::sized(request.body, request.content_length);

        let response = builder
            .body(body)
            .send()
            .map_err(|e| SyncError::transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Ok(HttpResponse {
            status,
            headers,
            body: Box::new(response),
        })
    }
}

/// A request captured by [`MockHttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Target URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Complete body.
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Returns the first header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

type Responder = Box<dyn Fn(&RecordedRequest) -> SyncResult<HttpResponse> + Send + Sync>;

/// In-memory client for tests.
///
/// Reads every request body completely, records it and answers with the
/// next queued response. Without queued responses the responder (if any)
/// is asked; otherwise the call fails with a transport error.
#[derive(Default)]
pub struct MockHttpClient {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<SyncResult<HttpResponse>>>,
    responder: Option<Responder>,
}

impl MockHttpClient {
    /// Creates a client with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that computes every response.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> SyncResult<HttpResponse> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: SyncError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Returns the recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl HttpClient for MockHttpClient {
    fn post(&self, mut request: HttpRequest) -> SyncResult<HttpResponse> {
        let mut body = Vec::new();
        request.body.read_to_end(&mut body)?;
        let recorded = RecordedRequest {
            url: request.url,
            headers: request.headers,
            body,
        };
        self.requests.lock().push(recorded.clone());

        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        match &self.responder {
            Some(responder) => responder(&recorded),
            None => Err(SyncError::transport("no response queued")),
        }
    }
}

impl std::fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("requests", &self.requests.lock().len())
            .field("queued", &self.responses.lock().len())
            .finish()
    }
}

/// Sends multipart requests and downloads responses to disk.
pub struct HttpTransport {
    client: Arc<dyn HttpClient>,
    cookies: Arc<CookieJar>,
}

impl HttpTransport {
    /// Creates a transport.
    pub fn new(client: Arc<dyn HttpClient>, cookies: Arc<CookieJar>) -> Self {
        Self { client, cookies }
    }

    /// Returns the shared cookie jar.
    pub fn cookies(&self) -> &Arc<CookieJar> {
        &self.cookies
    }

    /// Posts `payload` and the attached files to `url`.
    ///
    /// Returns the response body, or `None` on any failure.
    pub fn send_request(
        &self,
        url: &str,
        payload: &[u8],
        files: &[FilePart],
        progress: Option<Arc<dyn ProgressListener>>,
    ) -> Option<Vec<u8>> {
        let result = self.post(url, payload, files, progress).and_then(|mut response| {
            let mut body = Vec::new();
            response.body.read_to_end(&mut body)?;
            Ok(body)
        });

        match result {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!(url, error = %e, "request failed");
                None
            }
        }
    }

    /// Posts `payload` to `url` and writes the response body to `destination`.
    ///
    /// The body is written to a temporary file in the destination directory
    /// and moved into place once complete, so a failed download leaves no
    /// file behind. Returns false on any failure.
    pub fn download_request(&self, url: &str, payload: &[u8], destination: &Path) -> bool {
        let result = self
            .post(url, payload, &[], None)
            .and_then(|mut response| write_atomically(&mut response.body, destination));

        match result {
            Ok(bytes) => {
                tracing::debug!(url, path = %destination.display(), bytes, "downloaded");
                true
            }
            Err(e) => {
                tracing::warn!(url, path = %destination.display(), error = %e, "download failed");
                false
            }
        }
    }

    fn post(
        &self,
        url: &str,
        payload: &[u8],
        files: &[FilePart],
        progress: Option<Arc<dyn ProgressListener>>,
    ) -> SyncResult<HttpResponse> {
        let body = MultipartBody::new(payload, files)?;

        let mut headers = vec![
            ("Content-Type".to_string(), body.content_type()),
            ("Accept-Charset".to_string(), "UTF-8".to_string()),
            ("Content-Length".to_string(), body.content_length().to_string()),
        ];
        if let Some(cookie) = self.cookies.header() {
            headers.push(("Cookie".to_string(), cookie));
        }

        tracing::debug!(url, parts = body.part_count(), bytes = body.content_length(), "sending request");
        let content_length = body.content_length();
        let request = HttpRequest {
            url: url.to_string(),
            headers,
            body: Box::new(body.into_reader(progress)),
            content_length,
        };

        let response = self.client.post(request)?;
        if !response.is_success() {
            return Err(SyncError::Status {
                status: response.status,
            });
        }

        // Only a successful response may establish the session.
        self.cookies.capture(response.header_values("set-cookie"));
        Ok(response)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("cookies", &self.cookies)
            .finish()
    }
}

fn write_atomically(body: &mut dyn Read, destination: &Path) -> SyncResult<u64> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let bytes = io::copy(body, &mut tmp)?;
    tmp.persist(destination).map_err(|e| SyncError::Io(e.error))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn transport(client: Arc<MockHttpClient>) -> HttpTransport {
        HttpTransport::new(client, Arc::new(CookieJar::new()))
    }

    #[test]
    fn sends_multipart_headers() {
        let client = Arc::new(MockHttpClient::new());
        client.push_response(HttpResponse::new(200, b"reply".to_vec()));
        let transport = transport(Arc::clone(&client));

        let body = transport.send_request("http://h/publish", b"payload", &[], None);
        assert_eq!(body.as_deref(), Some(&b"reply"[..]));

        let request = &client.requests()[0];
        assert_eq!(request.url, "http://h/publish");
        assert!(request
            .header("content-type")
            .unwrap()
            .starts_with("multipart/form-data; boundary="));
        assert_eq!(request.header("accept-charset"), Some("UTF-8"));
        assert_eq!(
            request.header("content-length"),
            Some(request.body.len().to_string().as_str())
        );
        assert_eq!(request.header("cookie"), None);
    }

    #[test]
    fn cookie_from_first_response_is_replayed() {
        let client = Arc::new(MockHttpClient::new());
        client.push_response(
            HttpResponse::new(200, Vec::new()).with_header("Set-Cookie", "SID=xyz; Path=/"),
        );
        client.push_response(
            HttpResponse::new(200, Vec::new()).with_header("Set-Cookie", "SID=other"),
        );
        client.push_response(HttpResponse::new(200, Vec::new()));
        let transport = transport(Arc::clone(&client));

        for _ in 0..3 {
            transport.send_request("http://h/m", b"", &[], None).unwrap();
        }

        let requests = client.requests();
        assert_eq!(requests[0].header("cookie"), None);
        assert_eq!(requests[1].header("cookie"), Some("SID=xyz"));
        assert_eq!(requests[2].header("cookie"), Some("SID=xyz"));
    }

    #[test]
    fn cookie_from_error_response_is_ignored() {
        let client = Arc::new(MockHttpClient::new());
        client.push_response(
            HttpResponse::new(500, Vec::new()).with_header("Set-Cookie", "ERR=bad"),
        );
        client.push_response(
            HttpResponse::new(200, Vec::new()).with_header("Set-Cookie", "SID=good"),
        );
        client.push_response(HttpResponse::new(200, Vec::new()));
        let transport = transport(Arc::clone(&client));

        assert!(transport.send_request("http://h/m", b"", &[], None).is_none());
        assert!(transport.cookies().is_empty());
        transport.send_request("http://h/m", b"", &[], None).unwrap();
        transport.send_request("http://h/m", b"", &[], None).unwrap();

        let requests = client.requests();
        assert_eq!(requests[1].header("cookie"), None);
        assert_eq!(requests[2].header("cookie"), Some("SID=good"));
    }

    #[test]
    fn failures_yield_none() {
        let client = Arc::new(MockHttpClient::new());
        client.push_response(HttpResponse::new(500, b"oops".to_vec()));
        client.push_error(SyncError::transport("connection refused"));
        let transport = transport(Arc::clone(&client));

        assert!(transport.send_request("http://h/m", b"", &[], None).is_none());
        assert!(transport.send_request("http://h/m", b"", &[], None).is_none());

        let missing = [FilePart::new("f", "/nonexistent/editsync/blob")];
        assert!(transport.send_request("http://h/m", b"", &missing, None).is_none());
        assert_eq!(client.requests().len(), 2);
    }

    #[test]
    fn download_writes_destination() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(MockHttpClient::new());
        client.push_response(HttpResponse::new(200, b"blob bytes".to_vec()));
        let transport = transport(Arc::clone(&client));

        let destination = dir.path().join("nested").join("blob.bin");
        assert!(transport.download_request("http://h/blobdownload", b"k", &destination));
        assert_eq!(fs::read(&destination).unwrap(), b"blob bytes");
    }

    #[test]
    fn failed_download_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(MockHttpClient::new());
        client.push_response(HttpResponse::new(404, b"missing".to_vec()));
        let transport = transport(Arc::clone(&client));

        let destination = dir.path().join("blob.bin");
        assert!(!transport.download_request("http://h/blobdownload", b"k", &destination));
        assert!(!destination.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
