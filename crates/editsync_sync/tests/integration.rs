//! End-to-end tests against a local HTTP server.

use editsync_protocol::{
    BlobDownloadMethod, BugReportMethod, BugReportResponse, GetUploadUrlResponse, MethodEntity,
    PublishMethod, PublishResponse, ResourceRevisionEntity, ResponseEntity, ResponseStatus,
};
use editsync_store::Session;
use editsync_sync::{
    CookieJar, DownloadStatus, DownloadTask, FilePart, HttpTransport, ProgressListener,
    ReqwestClient, SyncConfig, SyncOrchestrator,
};
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tiny_http::{Header, Response, Server};
use uuid::Uuid;

/// What the server saw of one request.
#[derive(Debug, Clone)]
struct Captured {
    path: String,
    content_type: Option<String>,
    cookie: Option<String>,
    body: Vec<u8>,
}

type Reply = (u16, Vec<u8>, Vec<(String, String)>);

/// Starts a server answering every request with `reply` and returns its base
/// URL together with the captured requests.
fn serve<F>(reply: F) -> (String, Arc<Mutex<Vec<Captured>>>)
where
    F: Fn(&Captured) -> Reply + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);

    thread::spawn(move || {
        while let Ok(mut request) = server.recv() {
            let header = |name: &str| {
                request
                    .headers()
                    .iter()
                    .find(|h| h.field.to_string().eq_ignore_ascii_case(name))
                    .map(|h| h.value.to_string())
            };
            let mut seen = Captured {
                path: request.url().to_string(),
                content_type: header("Content-Type"),
                cookie: header("Cookie"),
                body: Vec::new(),
            };
            let _ = request.as_reader().read_to_end(&mut seen.body);

            let (status, body, headers) = reply(&seen);
            sink.lock().push(seen);

            let mut response = Response::from_data(body).with_status_code(status);
            for (name, value) in headers {
                response.add_header(Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap());
            }
            let _ = request.respond(response);
        }
    });

    (format!("http://{addr}/"), captured)
}

fn orchestrator(config: SyncConfig) -> SyncOrchestrator {
    let client = Arc::new(ReqwestClient::new(&config).unwrap());
    let transport = Arc::new(HttpTransport::new(client, Arc::new(CookieJar::new())));
    SyncOrchestrator::new(config, transport, Arc::new(Session::new()))
}

fn encoded(entity: ResponseEntity) -> Vec<u8> {
    entity.encode().unwrap()
}

#[test]
fn session_cookie_is_replayed() {
    let (base, captured) = serve(|_| {
        (
            200,
            encoded(ResponseEntity::BugReport(BugReportResponse {
                status: ResponseStatus::Success,
            })),
            vec![("Set-Cookie".into(), "SID=abc123; Path=/; HttpOnly".into())],
        )
    });
    let orchestrator = orchestrator(SyncConfig::new(base));
    let report = MethodEntity::BugReport(BugReportMethod {
        subject: "crash".into(),
        description: "editor closed".into(),
        exception: None,
        system_info: "linux".into(),
    });

    for _ in 0..2 {
        let response = orchestrator.serialize_and_send(&report);
        assert_eq!(
            response.and_then(|r| r.status()),
            Some(ResponseStatus::Success)
        );
    }

    let captured = captured.lock();
    assert_eq!(captured[0].path, "/bugreport");
    assert_eq!(captured[0].cookie, None);
    assert_eq!(captured[1].cookie.as_deref(), Some("SID=abc123"));
}

#[test]
fn upload_goes_to_rewritten_url() {
    let (base, captured) = serve(|request| match request.path.as_str() {
        "/getuploadurl" => (
            200,
            encoded(ResponseEntity::GetUploadUrl(GetUploadUrlResponse {
                upload_url: Some("http://10.1.2.3:8888/_ah/upload/xyz".into()),
            })),
            Vec::new(),
        ),
        "/_ah/upload/xyz" => (
            200,
            encoded(ResponseEntity::Publish(PublishResponse {
                status: ResponseStatus::Success,
            })),
            Vec::new(),
        ),
        _ => (404, Vec::new(), Vec::new()),
    });
    let orchestrator = orchestrator(SyncConfig::new(base));

    let dir = TempDir::new().unwrap();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    std::fs::write(dir.path().join("a"), b"first level").unwrap();
    std::fs::write(dir.path().join("b"), b"second level").unwrap();
    let files = vec![
        FilePart::new(first.to_string(), dir.path().join("a")),
        FilePart::new(second.to_string(), dir.path().join("b")),
    ];
    let method = MethodEntity::Publish(PublishMethod {
        resources: vec![
            ResourceRevisionEntity::new(first, 3),
            ResourceRevisionEntity::new(second, 3),
        ],
    });

    let written = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&written);
    let progress: Arc<dyn ProgressListener> =
        Arc::new(move |done: u64, total: u64| sink.lock().push((done, total)));

    let response = orchestrator.serialize_and_upload(&method, &files, Some(progress));
    assert_eq!(
        response.and_then(|r| r.status()),
        Some(ResponseStatus::Success)
    );

    let captured = captured.lock();
    assert_eq!(captured.len(), 2);
    let upload = &captured[1];
    assert_eq!(upload.path, "/_ah/upload/xyz");

    let content_type = upload.content_type.clone().unwrap();
    let boundary = content_type.split("boundary=").nth(1).unwrap();
    let body = String::from_utf8_lossy(&upload.body);
    assert_eq!(body.matches(&format!("--{boundary}\r\n")).count(), 3);
    assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    assert!(body.contains("first level"));
    assert!(body.contains(&format!("filename=\"{second}\"")));

    let written = written.lock();
    let &(done, total) = written.last().unwrap();
    assert_eq!(done, total);
    assert_eq!(total, upload.body.len() as u64);
}

#[test]
fn batch_download_writes_files() {
    let (base, captured) = serve(|request| {
        thread::sleep(Duration::from_millis(10));
        let body = String::from_utf8_lossy(&request.body).into_owned();
        match ["alpha", "beta", "gamma", "delta"]
            .iter()
            .find(|k| body.contains(*k))
        {
            Some(key) => (200, format!("blob {key}").into_bytes(), Vec::new()),
            None => (404, Vec::new(), Vec::new()),
        }
    });
    let orchestrator = orchestrator(SyncConfig::new(base).with_max_connections(2));

    let dir = TempDir::new().unwrap();
    let tasks = ["alpha", "beta", "gamma", "delta", "missing"]
        .iter()
        .map(|key| {
            DownloadTask::new(
                MethodEntity::BlobDownload(BlobDownloadMethod::new(*key)),
                dir.path().join(key),
            )
        })
        .collect();

    let seen = Mutex::new(Vec::new());
    let progress = |done: usize, total: usize| seen.lock().push((done, total));
    let tasks = orchestrator.download_in_threads(tasks, Some(&progress));

    for task in &tasks[..4] {
        assert_eq!(task.status, DownloadStatus::Succeeded);
    }
    assert_eq!(tasks[4].status, DownloadStatus::Failed);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("gamma")).unwrap(),
        "blob gamma"
    );
    assert!(!dir.path().join("missing").exists());

    let seen = seen.lock();
    assert_eq!(seen.first(), Some(&(0, 5)));
    assert_eq!(seen.last(), Some(&(5, 5)));
    assert_eq!(seen.len(), 6);
    assert_eq!(captured.lock().len(), 5);
}
