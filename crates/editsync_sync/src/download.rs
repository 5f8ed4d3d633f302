//! Bounded pool of blob download workers.
//!
//! Tasks from every batch share one FIFO queue. Workers are spawned on
//! demand, up to the configured maximum, and exit once the queue is empty.
//! Each batch waits on its own completion channel.

use crate::config::SyncConfig;
use crate::http::HttpTransport;
use crate::listener::DownloadProgressListener;
use editsync_protocol::MethodEntity;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

/// Completion state of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Not finished yet.
    Pending,
    /// The file was written.
    Succeeded,
    /// The download failed; no file was written.
    Failed,
}

/// A single download.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Method whose response body is the file content.
    pub method: MethodEntity,
    /// Where to write the file.
    pub destination: PathBuf,
    /// Completion state.
    pub status: DownloadStatus,
}

impl DownloadTask {
    /// Creates a pending task.
    pub fn new(method: MethodEntity, destination: impl Into<PathBuf>) -> Self {
        Self {
            method,
            destination: destination.into(),
            status: DownloadStatus::Pending,
        }
    }

    /// Returns true once the task finished, successfully or not.
    pub fn is_done(&self) -> bool {
        self.status != DownloadStatus::Pending
    }
}

struct Job {
    index: usize,
    method: MethodEntity,
    destination: PathBuf,
    done: Sender<(usize, DownloadStatus)>,
}

impl Job {
    fn finish(self, status: DownloadStatus) {
        // The batch may have given up waiting; nothing to report to then.
        let _ = self.done.send((self.index, status));
    }
}

#[derive(Default)]
struct PoolState {
    queue: VecDeque<Job>,
    active_workers: usize,
}

/// Shared download worker pool.
pub struct DownloadPool {
    transport: Arc<HttpTransport>,
    config: SyncConfig,
    state: Mutex<PoolState>,
}

impl DownloadPool {
    /// Creates a pool. No worker runs until tasks arrive.
    pub fn new(transport: Arc<HttpTransport>, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Returns the maximum number of concurrent workers.
    pub fn max_workers(&self) -> usize {
        self.config.max_connections.max(1)
    }

    /// Returns the number of running workers.
    pub fn active_workers(&self) -> usize {
        self.state.lock().active_workers
    }

    /// Downloads every task and blocks until all of them finished.
    ///
    /// `progress` is called with `(0, total)` first and then once per
    /// finished task with a strictly increasing count.
    pub fn download_all(
        self: &Arc<Self>,
        mut tasks: Vec<DownloadTask>,
        progress: Option<&dyn DownloadProgressListener>,
    ) -> Vec<DownloadTask> {
        let total = tasks.len();
        let report = |done: usize| {
            if let Some(progress) = progress {
                progress.on_download_progress(done, total);
            }
        };
        report(0);
        if total == 0 {
            return tasks;
        }

        let (tx, rx) = mpsc::channel();
        {
            let mut state = self.state.lock();
            for (index, task) in tasks.iter().enumerate() {
                state.queue.push_back(Job {
                    index,
                    method: task.method.clone(),
                    destination: task.destination.clone(),
                    done: tx.clone(),
                });
            }
        }
        drop(tx);
        self.top_up_workers();

        let mut completed = 0;
        while completed < total {
            match rx.recv() {
                Ok((index, status)) => {
                    tasks[index].status = status;
                    completed += 1;
                    report(completed);
                }
                Err(_) => {
                    tracing::error!(pending = total - completed, "download workers vanished");
                    break;
                }
            }
        }

        for task in tasks.iter_mut().filter(|t| !t.is_done()) {
            task.status = DownloadStatus::Failed;
        }
        tasks
    }

    fn top_up_workers(self: &Arc<Self>) {
        let mut state = self.state.lock();
        let wanted = state.queue.len().min(self.max_workers());
        while state.active_workers < wanted {
            let pool = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name("editsync-download".into())
                .spawn(move || pool.work());
            match spawned {
                Ok(_) => state.active_workers += 1,
                Err(e) => {
                    tracing::error!(error = %e, "failed to spawn download worker");
                    break;
                }
            }
        }

        // Without any worker the queued jobs would never finish.
        if state.active_workers == 0 {
            for job in state.queue.drain(..) {
                job.finish(DownloadStatus::Failed);
            }
        }
    }

    fn work(&self) {
        loop {
            let job = {
                let mut state = self.state.lock();
                match state.queue.pop_front() {
                    Some(job) => job,
                    None => {
                        state.active_workers -= 1;
                        return;
                    }
                }
            };

            let status = self.download(&job.method, &job.destination);
            job.finish(status);
        }
    }

    fn download(&self, method: &MethodEntity, destination: &Path) -> DownloadStatus {
        let payload = match method.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(method = method.method_name(), error = %e, "cannot encode download");
                return DownloadStatus::Failed;
            }
        };

        let url = self.config.method_url(method);
        if self.transport.download_request(&url, &payload, destination) {
            DownloadStatus::Succeeded
        } else {
            DownloadStatus::Failed
        }
    }
}

impl std::fmt::Debug for DownloadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DownloadPool")
            .field("max_workers", &self.max_workers())
            .field("queued", &state.queue.len())
            .field("active_workers", &state.active_workers)
            .finish()
    }
}
