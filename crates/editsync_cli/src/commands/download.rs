//! Download command implementation.

use editsync_protocol::{BlobDownloadMethod, MethodEntity};
use editsync_store::Session;
use editsync_sync::{
    CookieJar, DownloadStatus, DownloadTask, HttpTransport, ReqwestClient, SyncConfig,
    SyncOrchestrator,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Downloads every blob key into `out_dir`, one file per key.
pub fn run(
    server: &str,
    out_dir: &Path,
    max_connections: usize,
    keys: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(out_dir)?;

    let config = SyncConfig::new(server).with_max_connections(max_connections);
    let client = Arc::new(ReqwestClient::new(&config)?);
    let transport = Arc::new(HttpTransport::new(client, Arc::new(CookieJar::new())));
    let orchestrator = SyncOrchestrator::new(config, transport, Arc::new(Session::new()));

    let tasks = keys
        .into_iter()
        .map(|key| {
            let destination = out_dir.join(file_name(&key));
            DownloadTask::new(MethodEntity::BlobDownload(BlobDownloadMethod::new(key)), destination)
        })
        .collect();

    let progress = |done: usize, total: usize| info!(done, total, "download progress");
    let tasks = orchestrator.download_in_threads(tasks, Some(&progress));

    let failed: Vec<_> = tasks
        .iter()
        .filter(|t| t.status != DownloadStatus::Succeeded)
        .collect();
    for task in &tasks {
        let mark = if task.status == DownloadStatus::Succeeded {
            "ok"
        } else {
            "FAILED"
        };
        println!("  [{mark}] {}", task.destination.display());
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} of {} downloads failed", failed.len(), tasks.len()).into())
    }
}

/// Maps a blob key onto a safe file name.
fn file_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
